//! `OTA_HotelResNotifRQ` builder and parser (spec §4.3, reservations).

use chrono::NaiveDate;
use htng_common::HotelCode;
use htng_envelope::xmltree::{self, XmlNode};
use htng_errors::CoreError;

use crate::common::{format_date, parse_date, xml_escape, Violations};

const MAX_SPECIAL_REQUESTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
    Modified,
}

impl ReservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "Book",
            Self::Cancelled => "Cancel",
            Self::Modified => "Modify",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "Cancel" => Self::Cancelled,
            "Modify" => Self::Modified,
            _ => Self::Confirmed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResGuest {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStay {
    pub room_type: String,
    pub arrival: NaiveDate,
    pub departure: NaiveDate,
}

impl RoomStay {
    pub fn nights(&self) -> i64 {
        (self.departure - self.arrival).num_days()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub hotel_code: HotelCode,
    pub confirmation_id: String,
    pub status: ReservationStatus,
    pub guests: Vec<ResGuest>,
    pub room_stays: Vec<RoomStay>,
    pub special_requests: Vec<String>,
}

pub fn validate(reservation: &Reservation) -> Result<(), CoreError> {
    let mut violations = Violations::new();

    if reservation.guests.is_empty() {
        violations.push("reservation must have at least one guest");
    }
    for guest in &reservation.guests {
        if guest.first_name.trim().is_empty() {
            violations.push("res-guest first name must not be empty");
        }
        if guest.last_name.trim().is_empty() {
            violations.push("res-guest last name must not be empty");
        }
    }

    if reservation.room_stays.is_empty() {
        violations.push("reservation must have at least one room stay");
    }
    for stay in &reservation.room_stays {
        let nights = stay.nights();
        if !(1..=365).contains(&nights) {
            violations.push(format!("room stay nights {nights} out of range [1, 365]"));
        }
    }

    if reservation.special_requests.len() > MAX_SPECIAL_REQUESTS {
        violations.push(format!(
            "{} special requests exceeds the {MAX_SPECIAL_REQUESTS}-request maximum",
            reservation.special_requests.len()
        ));
    }

    violations.into_result()
}

pub fn build(reservation: &Reservation) -> Result<String, CoreError> {
    validate(reservation)?;

    let guests = reservation
        .guests
        .iter()
        .map(|g| {
            format!(
                r#"      <ResGuest><Profile><Customer><PersonName><GivenName>{first}</GivenName><Surname>{last}</Surname></PersonName></Customer></Profile></ResGuest>"#,
                first = xml_escape(&g.first_name),
                last = xml_escape(&g.last_name),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let room_stays = reservation
        .room_stays
        .iter()
        .map(|s| {
            format!(
                r#"      <RoomStay><RoomTypes><RoomType RoomTypeCode="{room_type}"/></RoomTypes><TimeSpan Start="{start}" End="{end}"/></RoomStay>"#,
                room_type = xml_escape(&s.room_type),
                start = format_date(s.arrival),
                end = format_date(s.departure),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let special_requests = reservation
        .special_requests
        .iter()
        .map(|r| format!(r#"      <SpecialRequest>{}</SpecialRequest>"#, xml_escape(r)))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(format!(
        r#"<ns:OTA_HotelResNotifRQ xmlns:ns="{ns}" HotelCode="{hotel_code}" ResStatus="{status}">
  <HotelReservations>
    <HotelReservation ResID_Value="{confirmation_id}">
      <ResGuests>
{guests}
      </ResGuests>
      <RoomStays>
{room_stays}
      </RoomStays>
      <SpecialRequests>
{special_requests}
      </SpecialRequests>
    </HotelReservation>
  </HotelReservations>
</ns:OTA_HotelResNotifRQ>"#,
        ns = htng_envelope::OTA_NS,
        hotel_code = xml_escape(reservation.hotel_code.as_str()),
        status = reservation.status.as_str(),
        confirmation_id = xml_escape(&reservation.confirmation_id),
    ))
}

pub fn parse(xml: &str) -> Result<Reservation, CoreError> {
    let root = xmltree::parse(xml).map_err(|e| CoreError::classify(Some("XML_PARSE_ERROR"), &e.to_string()))?;
    let hotel_code = root
        .attr("HotelCode")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "missing HotelCode attribute"))?;
    let hotel_code = HotelCode::parse(hotel_code)
        .map_err(|e| CoreError::classify(Some("VAL_HOTEL_CODE"), &e.to_string()))?;
    let status = ReservationStatus::parse(root.attr("ResStatus").unwrap_or("Book"));

    let hotel_reservation = root
        .find("HotelReservation")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "missing HotelReservation"))?;
    let confirmation_id = hotel_reservation
        .attr("ResID_Value")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "missing ResID_Value"))?
        .to_string();

    let mut guests = Vec::new();
    if let Some(res_guests) = hotel_reservation.child("ResGuests") {
        for guest_node in res_guests.children_named("ResGuest") {
            guests.push(parse_guest(guest_node)?);
        }
    }

    let mut room_stays = Vec::new();
    if let Some(stays) = hotel_reservation.child("RoomStays") {
        for stay_node in stays.children_named("RoomStay") {
            room_stays.push(parse_room_stay(stay_node)?);
        }
    }

    let mut special_requests = Vec::new();
    if let Some(requests) = hotel_reservation.child("SpecialRequests") {
        for r in requests.children_named("SpecialRequest") {
            let text = r.text_trimmed();
            if !text.is_empty() {
                special_requests.push(text.to_string());
            }
        }
    }

    Ok(Reservation { hotel_code, confirmation_id, status, guests, room_stays, special_requests })
}

fn parse_guest(node: &XmlNode) -> Result<ResGuest, CoreError> {
    let name = node
        .find("PersonName")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "ResGuest missing PersonName"))?;
    let first_name = name
        .child("GivenName")
        .map(|n| n.text_trimmed().to_string())
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "PersonName missing GivenName"))?;
    let last_name = name
        .child("Surname")
        .map(|n| n.text_trimmed().to_string())
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "PersonName missing Surname"))?;
    Ok(ResGuest { first_name, last_name })
}

fn parse_room_stay(node: &XmlNode) -> Result<RoomStay, CoreError> {
    let room_type = node
        .find("RoomType")
        .and_then(|rt| rt.attr("RoomTypeCode"))
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "RoomStay missing RoomTypeCode"))?
        .to_string();
    let span = node
        .child("TimeSpan")
        .ok_or_else(|| CoreError::classify(Some("XML_PARSE_ERROR"), "RoomStay missing TimeSpan"))?;
    let arrival = parse_date(span.attr("Start").unwrap_or_default())?;
    let departure = parse_date(span.attr("End").unwrap_or_default())?;
    Ok(RoomStay { room_type, arrival, departure })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Reservation {
        Reservation {
            hotel_code: HotelCode::parse("001234").unwrap(),
            confirmation_id: "CONF-9981".to_string(),
            status: ReservationStatus::Cancelled,
            guests: vec![ResGuest { first_name: "Jane".to_string(), last_name: "Doe".to_string() }],
            room_stays: vec![RoomStay {
                room_type: "KING".to_string(),
                arrival: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                departure: NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            }],
            special_requests: vec!["late check-in".to_string()],
        }
    }

    #[test]
    fn reservation_round_trips() {
        let reservation = sample();
        let xml = build(&reservation).unwrap();
        let parsed = parse(&xml).unwrap();
        assert_eq!(parsed, reservation);
    }

    #[test]
    fn rejects_zero_guests() {
        let mut reservation = sample();
        reservation.guests.clear();
        assert!(validate(&reservation).is_err());
    }

    #[test]
    fn rejects_zero_room_stays() {
        let mut reservation = sample();
        reservation.room_stays.clear();
        assert!(validate(&reservation).is_err());
    }

    #[test]
    fn rejects_nights_out_of_range() {
        let mut reservation = sample();
        reservation.room_stays[0].departure = reservation.room_stays[0].arrival;
        assert!(validate(&reservation).is_err());
    }

    #[test]
    fn rejects_too_many_special_requests() {
        let mut reservation = sample();
        reservation.special_requests = (0..21).map(|i| format!("request {i}")).collect();
        assert!(validate(&reservation).is_err());
    }

    #[test]
    fn rejects_blank_guest_name() {
        let mut reservation = sample();
        reservation.guests[0].first_name = "  ".to_string();
        assert!(validate(&reservation).is_err());
    }
}
