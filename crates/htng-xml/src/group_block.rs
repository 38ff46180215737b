//! `OTA_HotelInvBlockNotifRQ` builder and parser (spec §4.3, group blocks).

use chrono::NaiveDate;
use htng_common::HotelCode;
use htng_envelope::xmltree;
use htng_errors::CoreError;

use crate::common::{format_date, parse_date, xml_escape, Violations};

const MAX_BLOCK_CODE_LEN: usize = 20;
const MAX_BLOCK_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBlock {
    pub hotel_code: HotelCode,
    pub block_code: String,
    pub block_name: String,
    pub room_count: u32,
    /// OTA pickup status: 1 = open, 2 = partially picked up, 3 = closed.
    pub pickup_status: u8,
    pub cutoff_days: u32,
    pub arrival: NaiveDate,
    pub departure: NaiveDate,
}

pub fn validate(block: &GroupBlock) -> Result<(), CoreError> {
    let mut violations = Violations::new();

    if block.block_code.is_empty() || block.block_code.len() > MAX_BLOCK_CODE_LEN {
        violations.push(format!(
            "block code must be 1-{MAX_BLOCK_CODE_LEN} characters, got {}",
            block.block_code.len()
        ));
    }
    if block.block_name.is_empty() || block.block_name.len() > MAX_BLOCK_NAME_LEN {
        violations.push(format!(
            "block name must be 1-{MAX_BLOCK_NAME_LEN} characters, got {}",
            block.block_name.len()
        ));
    }
    if !(1..=1000).contains(&block.room_count) {
        violations.push(format!("room count {} out of range [1, 1000]", block.room_count));
    }
    if !(1..=3).contains(&block.pickup_status) {
        violations.push(format!("pickup status {} must be one of {{1, 2, 3}}", block.pickup_status));
    }
    if block.cutoff_days > 365 {
        violations.push(format!("cutoff days {} out of range [0, 365]", block.cutoff_days));
    }
    if block.departure <= block.arrival {
        violations.push("departure must be after arrival");
    }

    violations.into_result()
}

pub fn build(block: &GroupBlock) -> Result<String, CoreError> {
    validate(block)?;

    Ok(format!(
        r#"<ns:OTA_HotelInvBlockNotifRQ xmlns:ns="{ns}" HotelCode="{hotel_code}">
  <InvBlock BlockCode="{block_code}" BlockName="{block_name}" RoomCount="{room_count}" PickupStatus="{pickup_status}" CutoffDays="{cutoff_days}">
    <StayDateRange Start="{arrival}" End="{departure}"/>
  </InvBlock>
</ns:OTA_HotelInvBlockNotifRQ>"#,
        ns = htng_envelope::OTA_NS,
        hotel_code = xml_escape(block.hotel_code.as_str()),
        block_code = xml_escape(&block.block_code),
        block_name = xml_escape(&block.block_name),
        room_count = block.room_count,
        pickup_status = block.pickup_status,
        cutoff_days = block.cutoff_days,
        arrival = format_date(block.arrival),
        departure = format_date(block.departure),
    ))
}

pub fn parse(xml: &str) -> Result<GroupBlock, CoreError> {
    let root = xmltree::parse(xml).map_err(|e| CoreError::classify(Some("XML_PARSE_ERROR"), &e.to_string()))?;
    let hotel_code = root
        .attr("HotelCode")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "missing HotelCode attribute"))?;
    let hotel_code = HotelCode::parse(hotel_code)
        .map_err(|e| CoreError::classify(Some("VAL_HOTEL_CODE"), &e.to_string()))?;

    let inv_block = root
        .find("InvBlock")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "missing InvBlock"))?;
    let block_code = inv_block
        .attr("BlockCode")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "InvBlock missing BlockCode"))?
        .to_string();
    let block_name = inv_block
        .attr("BlockName")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "InvBlock missing BlockName"))?
        .to_string();
    let room_count: u32 = inv_block
        .attr("RoomCount")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "InvBlock missing RoomCount"))?;
    let pickup_status: u8 = inv_block
        .attr("PickupStatus")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "InvBlock missing PickupStatus"))?;
    let cutoff_days: u32 = inv_block
        .attr("CutoffDays")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "InvBlock missing CutoffDays"))?;
    let span = inv_block
        .child("StayDateRange")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "InvBlock missing StayDateRange"))?;
    let arrival = parse_date(span.attr("Start").unwrap_or_default())?;
    let departure = parse_date(span.attr("End").unwrap_or_default())?;

    Ok(GroupBlock {
        hotel_code,
        block_code,
        block_name,
        room_count,
        pickup_status,
        cutoff_days,
        arrival,
        departure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GroupBlock {
        GroupBlock {
            hotel_code: HotelCode::parse("001234").unwrap(),
            block_code: "CONF2025".to_string(),
            block_name: "Annual Sales Conference".to_string(),
            room_count: 40,
            pickup_status: 1,
            cutoff_days: 14,
            arrival: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            departure: NaiveDate::from_ymd_opt(2025, 9, 5).unwrap(),
        }
    }

    #[test]
    fn group_block_round_trips() {
        let block = sample();
        let xml = build(&block).unwrap();
        let parsed = parse(&xml).unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn rejects_room_count_out_of_range() {
        let mut block = sample();
        block.room_count = 0;
        assert!(validate(&block).is_err());
        block.room_count = 1001;
        assert!(validate(&block).is_err());
    }

    #[test]
    fn rejects_invalid_pickup_status() {
        let mut block = sample();
        block.pickup_status = 9;
        assert!(validate(&block).is_err());
    }

    #[test]
    fn rejects_block_code_over_length_limit() {
        let mut block = sample();
        block.block_code = "X".repeat(21);
        assert!(validate(&block).is_err());
    }

    #[test]
    fn rejects_cutoff_over_365_days() {
        let mut block = sample();
        block.cutoff_days = 400;
        assert!(validate(&block).is_err());
    }
}
