//! `OTA_HotelInvCountNotifRQ` builder and parser (spec §4.3, inventory).

use chrono::NaiveDate;
use htng_common::HotelCode;
use htng_envelope::xmltree::{self, XmlNode};
use htng_errors::CoreError;

use crate::common::{format_date, parse_date, validate_date_range, xml_escape, Violations};

const NOT_CALCULATED: u32 = 2;
const CALCULATED_REQUIRED: [u32; 2] = [4, 5];
const CALCULATED_OPTIONAL: [u32; 3] = [1, 6, 99];

/// One `Count` element: an OTA count-type code paired with an integer
/// value in `[0, 9999]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvCount {
    pub count_type: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRecord {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// `None` for a property-level record; `Some(code)` for a room-level one.
    pub room_type: Option<String>,
    pub counts: Vec<InvCount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryMessage {
    pub hotel_code: HotelCode,
    pub records: Vec<InventoryRecord>,
}

/// Validate a single record against the not-calculated / calculated rules
/// (spec §4.3) and the shared date-range bounds.
pub fn validate_record(record: &InventoryRecord, today: NaiveDate) -> Result<(), CoreError> {
    let mut violations = Violations::new();
    validate_date_range(record.start, record.end, today, &mut violations);

    for c in &record.counts {
        if c.count > 9999 {
            violations.push(format!("count value {} exceeds maximum of 9999", c.count));
        }
    }

    let has_not_calculated = record.counts.iter().any(|c| c.count_type == NOT_CALCULATED);
    if has_not_calculated {
        if record.counts.len() != 1 {
            violations.push(
                "not-calculated inventory (CountType=2) must not be combined with any other count type",
            );
        }
    } else {
        for required in CALCULATED_REQUIRED {
            if !record.counts.iter().any(|c| c.count_type == required) {
                violations.push(format!(
                    "calculated inventory requires CountType={required} to be present"
                ));
            }
        }
        for c in &record.counts {
            if c.count_type != NOT_CALCULATED
                && !CALCULATED_REQUIRED.contains(&c.count_type)
                && !CALCULATED_OPTIONAL.contains(&c.count_type)
            {
                violations.push(format!("unrecognized CountType={}", c.count_type));
            }
        }
    }

    violations.into_result()
}

/// Build the HTNG inventory-count notification body for a property.
pub fn build(message: &InventoryMessage, today: NaiveDate) -> Result<String, CoreError> {
    for record in &message.records {
        validate_record(record, today)?;
    }

    let mut inventories = String::new();
    for record in &message.records {
        let room_type_attr = record
            .room_type
            .as_ref()
            .map(|rt| format!(" InvTypeCode=\"{}\"", xml_escape(rt)))
            .unwrap_or_default();
        let counts = record
            .counts
            .iter()
            .map(|c| format!(r#"        <Count CountType="{}" Count="{}"/>"#, c.count_type, c.count))
            .collect::<Vec<_>>()
            .join("\n");
        inventories.push_str(&format!(
            r#"    <Inventory>
      <StatusApplicationControl Start="{start}" End="{end}"{room_type_attr}/>
      <InvCounts>
{counts}
      </InvCounts>
    </Inventory>
"#,
            start = format_date(record.start),
            end = format_date(record.end),
        ));
    }

    Ok(format!(
        r#"<ns:OTA_HotelInvCountNotifRQ xmlns:ns="{ns}" HotelCode="{hotel_code}">
  <Inventories>
{inventories}  </Inventories>
</ns:OTA_HotelInvCountNotifRQ>"#,
        ns = htng_envelope::OTA_NS,
        hotel_code = xml_escape(message.hotel_code.as_str()),
    ))
}

/// Parse a previously-built (or received) inventory notification body.
pub fn parse(xml: &str) -> Result<InventoryMessage, CoreError> {
    let root = xmltree::parse(xml).map_err(|e| CoreError::classify(Some("XML_PARSE_ERROR"), &e.to_string()))?;
    let hotel_code = root
        .attr("HotelCode")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "missing HotelCode attribute"))?;
    let hotel_code = HotelCode::parse(hotel_code)
        .map_err(|e| CoreError::classify(Some("VAL_HOTEL_CODE"), &e.to_string()))?;

    let mut records = Vec::new();
    if let Some(inventories) = root.find("Inventories") {
        for inv in inventories.children_named("Inventory") {
            records.push(parse_record(inv)?);
        }
    }

    Ok(InventoryMessage { hotel_code, records })
}

fn parse_record(inv: &XmlNode) -> Result<InventoryRecord, CoreError> {
    let sac = inv
        .child("StatusApplicationControl")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "Inventory missing StatusApplicationControl"))?;
    let start = parse_date(sac.attr("Start").unwrap_or_default())?;
    let end = parse_date(sac.attr("End").unwrap_or_default())?;
    let room_type = sac.attr("InvTypeCode").map(str::to_string);

    let mut counts = Vec::new();
    if let Some(inv_counts) = inv.child("InvCounts") {
        for count in inv_counts.children_named("Count") {
            let count_type: u32 = count
                .attr("CountType")
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "Count missing CountType"))?;
            let value: u32 = count
                .attr("Count")
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "Count missing value"))?;
            counts.push(InvCount { count_type, count: value });
        }
    }

    Ok(InventoryRecord { start, end, room_type, counts })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
    }

    fn sample_record(counts: Vec<InvCount>) -> InventoryRecord {
        InventoryRecord {
            start: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            room_type: Some("KING".to_string()),
            counts,
        }
    }

    #[test]
    fn not_calculated_record_round_trips() {
        let message = InventoryMessage {
            hotel_code: HotelCode::parse("001234").unwrap(),
            records: vec![sample_record(vec![InvCount { count_type: 2, count: 5 }])],
        };
        let xml = build(&message, today()).unwrap();
        let parsed = parse(&xml).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn not_calculated_rejects_other_count_types_present() {
        let record = sample_record(vec![
            InvCount { count_type: 2, count: 5 },
            InvCount { count_type: 1, count: 1 },
        ]);
        assert!(validate_record(&record, today()).is_err());
    }

    #[test]
    fn calculated_requires_4_and_5_together() {
        let missing_five = sample_record(vec![InvCount { count_type: 4, count: 3 }]);
        assert!(validate_record(&missing_five, today()).is_err());

        let both_present = sample_record(vec![
            InvCount { count_type: 4, count: 3 },
            InvCount { count_type: 5, count: 2 },
        ]);
        assert!(validate_record(&both_present, today()).is_ok());
    }

    #[test]
    fn calculated_forbids_count_type_2() {
        let record = sample_record(vec![
            InvCount { count_type: 2, count: 1 },
            InvCount { count_type: 4, count: 3 },
            InvCount { count_type: 5, count: 2 },
        ]);
        // CountType=2 present alongside others is rejected by the
        // not-calculated branch (any combination with 2 is invalid).
        assert!(validate_record(&record, today()).is_err());
    }

    #[test]
    fn rejects_count_out_of_range() {
        let record = sample_record(vec![InvCount { count_type: 2, count: 10_000 }]);
        assert!(validate_record(&record, today()).is_err());
    }

    #[test]
    fn rejects_date_span_over_365_days() {
        let mut record = sample_record(vec![InvCount { count_type: 2, count: 1 }]);
        record.end = record.start + chrono::Duration::days(400);
        assert!(validate_record(&record, today()).is_err());
    }

    #[test]
    fn property_level_record_has_no_room_type() {
        let mut record = sample_record(vec![InvCount { count_type: 2, count: 1 }]);
        record.room_type = None;
        let message = InventoryMessage {
            hotel_code: HotelCode::parse("001234").unwrap(),
            records: vec![record],
        };
        let xml = build(&message, today()).unwrap();
        let parsed = parse(&xml).unwrap();
        assert_eq!(parsed.records[0].room_type, None);
    }
}
