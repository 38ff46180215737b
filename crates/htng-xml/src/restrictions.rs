//! `OTA_HotelAvailNotifRQ` builder and parser (spec §4.3, restrictions).

use chrono::NaiveDate;
use htng_common::HotelCode;
use htng_envelope::xmltree::{self, XmlNode};
use htng_errors::CoreError;

use crate::common::{format_date, parse_date, validate_date_range, xml_escape, Violations};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionType {
    Open,
    Cta,
    Ctd,
    Master,
    MinLos,
    MaxLos,
}

impl RestrictionType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Cta => "CTA",
            Self::Ctd => "CTD",
            Self::Master => "Master",
            Self::MinLos => "MinLOS",
            Self::MaxLos => "MaxLOS",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Open" => Some(Self::Open),
            "CTA" => Some(Self::Cta),
            "CTD" => Some(Self::Ctd),
            "Master" => Some(Self::Master),
            "MinLOS" => Some(Self::MinLos),
            "MaxLOS" => Some(Self::MaxLos),
            _ => None,
        }
    }

    fn requires_los(self) -> bool {
        matches!(self, Self::MinLos | Self::MaxLos)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionRecord {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub room_type: Option<String>,
    pub restriction_type: RestrictionType,
    pub los: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionMessage {
    pub hotel_code: HotelCode,
    pub records: Vec<RestrictionRecord>,
}

pub fn validate_record(record: &RestrictionRecord, today: NaiveDate) -> Result<(), CoreError> {
    let mut violations = Violations::new();
    validate_date_range(record.start, record.end, today, &mut violations);

    if record.restriction_type.requires_los() {
        match record.los {
            Some(los) if (1..=30).contains(&los) => {}
            Some(los) => violations.push(format!("length-of-stay {los} out of range [1, 30]")),
            None => violations.push("min_los/max_los restrictions require a length-of-stay value"),
        }
    } else if let Some(los) = record.los {
        if !(1..=30).contains(&los) {
            violations.push(format!("length-of-stay {los} out of range [1, 30]"));
        }
    }

    violations.into_result()
}

pub fn build(message: &RestrictionMessage, today: NaiveDate) -> Result<String, CoreError> {
    for record in &message.records {
        validate_record(record, today)?;
    }

    let records = message
        .records
        .iter()
        .map(|r| {
            let room_type_attr = r
                .room_type
                .as_ref()
                .map(|rt| format!(r#" InvTypeCode="{}""#, xml_escape(rt)))
                .unwrap_or_default();
            let los_attr = r.los.map(|los| format!(r#" LOS="{los}""#)).unwrap_or_default();
            format!(
                r#"    <AvailStatusMessage Start="{start}" End="{end}" RestrictionStatus="{restriction}"{room_type_attr}{los_attr}/>"#,
                start = format_date(r.start),
                end = format_date(r.end),
                restriction = r.restriction_type.as_str(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(format!(
        r#"<ns:OTA_HotelAvailNotifRQ xmlns:ns="{ns}" HotelCode="{hotel_code}">
  <AvailStatusMessages>
{records}
  </AvailStatusMessages>
</ns:OTA_HotelAvailNotifRQ>"#,
        ns = htng_envelope::OTA_NS,
        hotel_code = xml_escape(message.hotel_code.as_str()),
    ))
}

pub fn parse(xml: &str) -> Result<RestrictionMessage, CoreError> {
    let root = xmltree::parse(xml).map_err(|e| CoreError::classify(Some("XML_PARSE_ERROR"), &e.to_string()))?;
    let hotel_code = root
        .attr("HotelCode")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "missing HotelCode attribute"))?;
    let hotel_code = HotelCode::parse(hotel_code)
        .map_err(|e| CoreError::classify(Some("VAL_HOTEL_CODE"), &e.to_string()))?;

    let mut records = Vec::new();
    if let Some(messages) = root.find("AvailStatusMessages") {
        for node in messages.children_named("AvailStatusMessage") {
            records.push(parse_record(node)?);
        }
    }

    Ok(RestrictionMessage { hotel_code, records })
}

fn parse_record(node: &XmlNode) -> Result<RestrictionRecord, CoreError> {
    let start = parse_date(node.attr("Start").unwrap_or_default())?;
    let end = parse_date(node.attr("End").unwrap_or_default())?;
    let restriction_type = node
        .attr("RestrictionStatus")
        .and_then(RestrictionType::parse)
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "missing or unknown RestrictionStatus"))?;
    let room_type = node.attr("InvTypeCode").map(str::to_string);
    let los = node.attr("LOS").and_then(|s| s.parse().ok());

    Ok(RestrictionRecord { start, end, room_type, restriction_type, los })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
    }

    fn sample(restriction_type: RestrictionType, los: Option<u32>) -> RestrictionRecord {
        RestrictionRecord {
            start: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            room_type: Some("KING".to_string()),
            restriction_type,
            los,
        }
    }

    #[test]
    fn restriction_round_trips() {
        let message = RestrictionMessage {
            hotel_code: HotelCode::parse("001234").unwrap(),
            records: vec![sample(RestrictionType::Cta, None)],
        };
        let xml = build(&message, today()).unwrap();
        let parsed = parse(&xml).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn min_los_requires_length_of_stay() {
        let record = sample(RestrictionType::MinLos, None);
        assert!(validate_record(&record, today()).is_err());

        let record = sample(RestrictionType::MinLos, Some(3));
        assert!(validate_record(&record, today()).is_ok());
    }

    #[test]
    fn rejects_los_out_of_range() {
        let record = sample(RestrictionType::MaxLos, Some(31));
        assert!(validate_record(&record, today()).is_err());
    }
}
