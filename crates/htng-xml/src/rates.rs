//! `OTA_HotelRateNotifRQ` builder and parser (spec §4.3, rates).

use std::sync::OnceLock;

use chrono::NaiveDate;
use htng_common::HotelCode;
use htng_envelope::xmltree::{self, XmlNode};
use htng_errors::CoreError;
use regex::Regex;
use rust_decimal::Decimal;

use crate::common::{format_date, parse_date, validate_date_range, xml_escape, Violations};

const MAX_PLANS_PER_ENVELOPE: usize = 50;
const MAX_RECORDS_PER_PLAN: usize = 365;

fn rate_plan_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,20}$").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOperation {
    Create,
    Update,
    Inactivate,
    RemoveRoomTypes,
}

impl RateOperation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Inactivate => "Inactivate",
            Self::RemoveRoomTypes => "RemoveRoomTypes",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Create" => Some(Self::Create),
            "Update" => Some(Self::Update),
            "Inactivate" => Some(Self::Inactivate),
            "RemoveRoomTypes" => Some(Self::RemoveRoomTypes),
            _ => None,
        }
    }
}

/// Whether the batch carries only dirty records since `last_success`
/// (`Delta`) or every applicable record (`FullSync`); the latter bypasses
/// the dedup cache in the scheduler but still passes through validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Delta,
    FullSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateAmounts {
    pub first_guest: Decimal,
    pub second_guest: Decimal,
    pub third_guest: Option<Decimal>,
    pub fourth_guest: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRecord {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub room_type: String,
    pub amounts: RateAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePlan {
    pub code: String,
    pub operation: RateOperation,
    pub records: Vec<RateRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateMessage {
    pub hotel_code: HotelCode,
    pub sync_mode: SyncMode,
    pub plans: Vec<RatePlan>,
}

fn validate_amount(amount: Decimal, label: &str, violations: &mut Violations) {
    let min = Decimal::new(0, 2);
    let max = Decimal::new(9_999_999, 2); // 99999.99
    if amount <= min || amount > max {
        violations.push(format!("{label} amount {amount} is out of range (0.00, 99999.99]"));
    }
    if amount.scale() > 2 {
        violations.push(format!("{label} amount {amount} has more than two decimal places"));
    }
}

pub fn validate_plan(plan: &RatePlan, today: NaiveDate) -> Result<(), CoreError> {
    let mut violations = Violations::new();
    if !rate_plan_code_pattern().is_match(&plan.code) {
        violations.push(format!("rate plan code {:?} does not match the required pattern", plan.code));
    }
    if plan.records.len() > MAX_RECORDS_PER_PLAN {
        violations.push(format!(
            "rate plan {:?} has {} records, exceeding the {MAX_RECORDS_PER_PLAN}-record maximum",
            plan.code,
            plan.records.len()
        ));
    }
    for record in &plan.records {
        validate_date_range(record.start, record.end, today, &mut violations);
        validate_amount(record.amounts.first_guest, "1st-guest", &mut violations);
        validate_amount(record.amounts.second_guest, "2nd-guest", &mut violations);
        if let Some(third) = record.amounts.third_guest {
            validate_amount(third, "3rd-guest", &mut violations);
        }
        if let Some(fourth) = record.amounts.fourth_guest {
            if record.amounts.third_guest.is_none() {
                violations.push("4th-guest amount present without a 3rd-guest amount".to_string());
            }
            validate_amount(fourth, "4th-guest", &mut violations);
        }
    }
    violations.into_result()
}

pub fn validate_message(message: &RateMessage, today: NaiveDate) -> Result<(), CoreError> {
    let mut violations = Violations::new();
    if message.plans.len() > MAX_PLANS_PER_ENVELOPE {
        violations.push(format!(
            "envelope carries {} rate plans, exceeding the {MAX_PLANS_PER_ENVELOPE}-plan maximum",
            message.plans.len()
        ));
    }
    violations.into_result()?;
    for plan in &message.plans {
        validate_plan(plan, today)?;
    }
    Ok(())
}

pub fn build(message: &RateMessage, today: NaiveDate) -> Result<String, CoreError> {
    validate_message(message, today)?;

    let mut plans_xml = String::new();
    for plan in &message.plans {
        let mut rates_xml = String::new();
        for record in &plan.records {
            let third = record
                .amounts
                .third_guest
                .map(|v| format!(r#" ThirdGuestAmount="{v:.2}""#))
                .unwrap_or_default();
            let fourth = record
                .amounts
                .fourth_guest
                .map(|v| format!(r#" FourthGuestAmount="{v:.2}""#))
                .unwrap_or_default();
            rates_xml.push_str(&format!(
                r#"      <Rate Start="{start}" End="{end}" InvTypeCode="{room_type}" FirstGuestAmount="{first:.2}" SecondGuestAmount="{second:.2}"{third}{fourth}/>
"#,
                start = format_date(record.start),
                end = format_date(record.end),
                room_type = xml_escape(&record.room_type),
                first = record.amounts.first_guest,
                second = record.amounts.second_guest,
            ));
        }
        plans_xml.push_str(&format!(
            r#"  <RatePlan RatePlanCode="{code}" Operation="{op}">
    <Rates>
{rates_xml}    </Rates>
  </RatePlan>
"#,
            code = xml_escape(&plan.code),
            op = plan.operation.as_str(),
        ));
    }

    Ok(format!(
        r#"<ns:OTA_HotelRateNotifRQ xmlns:ns="{ns}" HotelCode="{hotel_code}" SyncMode="{sync_mode}">
  <RatePlans>
{plans_xml}  </RatePlans>
</ns:OTA_HotelRateNotifRQ>"#,
        ns = htng_envelope::OTA_NS,
        hotel_code = xml_escape(message.hotel_code.as_str()),
        sync_mode = match message.sync_mode {
            SyncMode::Delta => "Delta",
            SyncMode::FullSync => "FullSync",
        },
    ))
}

pub fn parse(xml: &str) -> Result<RateMessage, CoreError> {
    let root = xmltree::parse(xml).map_err(|e| CoreError::classify(Some("XML_PARSE_ERROR"), &e.to_string()))?;
    let hotel_code = root
        .attr("HotelCode")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "missing HotelCode attribute"))?;
    let hotel_code = HotelCode::parse(hotel_code)
        .map_err(|e| CoreError::classify(Some("VAL_HOTEL_CODE"), &e.to_string()))?;
    let sync_mode = match root.attr("SyncMode") {
        Some("FullSync") => SyncMode::FullSync,
        _ => SyncMode::Delta,
    };

    let mut plans = Vec::new();
    if let Some(rate_plans) = root.find("RatePlans") {
        for plan_node in rate_plans.children_named("RatePlan") {
            plans.push(parse_plan(plan_node)?);
        }
    }

    Ok(RateMessage { hotel_code, sync_mode, plans })
}

fn parse_plan(node: &XmlNode) -> Result<RatePlan, CoreError> {
    let code = node
        .attr("RatePlanCode")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "RatePlan missing RatePlanCode"))?
        .to_string();
    let operation = node
        .attr("Operation")
        .and_then(RateOperation::parse)
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "RatePlan missing or invalid Operation"))?;

    let mut records = Vec::new();
    if let Some(rates) = node.child("Rates") {
        for rate in rates.children_named("Rate") {
            records.push(parse_record(rate)?);
        }
    }

    Ok(RatePlan { code, operation, records })
}

fn parse_decimal_attr(node: &XmlNode, name: &str) -> Result<Decimal, CoreError> {
    let raw = node
        .attr(name)
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), &format!("Rate missing {name}")))?;
    raw.parse()
        .map_err(|_| CoreError::classify(Some("XML_PARSE_ERROR"), &format!("invalid amount in {name}: {raw}")))
}

fn parse_record(node: &XmlNode) -> Result<RateRecord, CoreError> {
    let start = parse_date(node.attr("Start").unwrap_or_default())?;
    let end = parse_date(node.attr("End").unwrap_or_default())?;
    let room_type = node
        .attr("InvTypeCode")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "Rate missing InvTypeCode"))?
        .to_string();
    let first_guest = parse_decimal_attr(node, "FirstGuestAmount")?;
    let second_guest = parse_decimal_attr(node, "SecondGuestAmount")?;
    let third_guest = node.attr("ThirdGuestAmount").map(|_| parse_decimal_attr(node, "ThirdGuestAmount")).transpose()?;
    let fourth_guest = node.attr("FourthGuestAmount").map(|_| parse_decimal_attr(node, "FourthGuestAmount")).transpose()?;

    Ok(RateRecord {
        start,
        end,
        room_type,
        amounts: RateAmounts { first_guest, second_guest, third_guest, fourth_guest },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(raw: &str) -> Decimal {
        Decimal::from_str(raw).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
    }

    fn sample_message() -> RateMessage {
        RateMessage {
            hotel_code: HotelCode::parse("001234").unwrap(),
            sync_mode: SyncMode::Delta,
            plans: vec![RatePlan {
                code: "BAR".to_string(),
                operation: RateOperation::Update,
                records: vec![RateRecord {
                    start: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
                    end: NaiveDate::from_ymd_opt(2025, 7, 7).unwrap(),
                    room_type: "KING".to_string(),
                    amounts: RateAmounts {
                        first_guest: d("150.00"),
                        second_guest: d("175.00"),
                        third_guest: None,
                        fourth_guest: None,
                    },
                }],
            }],
        }
    }

    #[test]
    fn rate_message_round_trips() {
        let message = sample_message();
        let xml = build(&message, today()).unwrap();
        let parsed = parse(&xml).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn rejects_missing_first_or_second_guest_amount_is_unrepresentable() {
        // first_guest/second_guest are non-optional in the DTO; the rule
        // is enforced structurally. Confirm the amount bound still fires
        // for a zero value (effectively "missing").
        let mut message = sample_message();
        message.plans[0].records[0].amounts.first_guest = d("0.00");
        assert!(validate_message(&message, today()).is_err());
    }

    #[test]
    fn rejects_fourth_without_third() {
        let mut message = sample_message();
        message.plans[0].records[0].amounts.fourth_guest = Some(d("50.00"));
        assert!(validate_message(&message, today()).is_err());
    }

    #[test]
    fn accepts_third_and_fourth_together() {
        let mut message = sample_message();
        message.plans[0].records[0].amounts.third_guest = Some(d("190.00"));
        message.plans[0].records[0].amounts.fourth_guest = Some(d("205.00"));
        assert!(validate_message(&message, today()).is_ok());
    }

    #[test]
    fn rejects_invalid_rate_plan_code() {
        let mut message = sample_message();
        message.plans[0].code = "this code has spaces".to_string();
        assert!(validate_message(&message, today()).is_err());
    }

    #[test]
    fn rejects_amount_above_ceiling() {
        let mut message = sample_message();
        message.plans[0].records[0].amounts.first_guest = d("100000.00");
        assert!(validate_message(&message, today()).is_err());
    }

    #[test]
    fn rejects_too_many_plans() {
        let mut message = sample_message();
        let template = message.plans[0].clone();
        for i in 0..60 {
            let mut plan = template.clone();
            plan.code = format!("P{i}");
            message.plans.push(plan);
        }
        assert!(validate_message(&message, today()).is_err());
    }
}
