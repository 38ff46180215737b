//! HTNG 2011B XML builders and parsers, one module per message kind
//! (spec §4.3). Every builder validates its preconditions before
//! serializing; a violated rule fails with a `validation` error rather
//! than producing malformed XML.

pub mod common;
pub mod group_block;
pub mod inventory;
pub mod rates;
pub mod reservation;
pub mod restrictions;

use htng_common::MessageKind;
use htng_envelope::xmltree;
use htng_errors::CoreError;

/// The closed set of OTA root elements the inbound dispatcher recognizes
/// (spec §4.7). An unrecognized root element is not represented here —
/// callers must treat it as a SOAP fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaRoot {
    HotelResNotifRQ,
    HotelInvBlockNotifRQ,
    HotelInvCountNotifRQ,
    HotelRateNotifRQ,
    HotelAvailNotifRQ,
}

impl OtaRoot {
    pub fn message_kind(self) -> MessageKind {
        match self {
            Self::HotelResNotifRQ => MessageKind::Reservation,
            Self::HotelInvBlockNotifRQ => MessageKind::GroupBlock,
            Self::HotelInvCountNotifRQ => MessageKind::Inventory,
            Self::HotelRateNotifRQ => MessageKind::Rates,
            Self::HotelAvailNotifRQ => MessageKind::Restrictions,
        }
    }

    fn from_root_name(name: &str) -> Option<Self> {
        match name {
            "OTA_HotelResNotifRQ" => Some(Self::HotelResNotifRQ),
            "OTA_HotelInvBlockNotifRQ" => Some(Self::HotelInvBlockNotifRQ),
            "OTA_HotelInvCountNotifRQ" => Some(Self::HotelInvCountNotifRQ),
            "OTA_HotelRateNotifRQ" => Some(Self::HotelRateNotifRQ),
            "OTA_HotelAvailNotifRQ" => Some(Self::HotelAvailNotifRQ),
            _ => None,
        }
    }

    /// The `OTA_*RS` acknowledgment root element to pair with this
    /// request kind.
    pub fn response_root_tag(self) -> &'static str {
        match self {
            Self::HotelResNotifRQ => "OTA_HotelResNotifRS",
            Self::HotelInvBlockNotifRQ => "OTA_HotelInvBlockNotifRS",
            Self::HotelInvCountNotifRQ => "OTA_HotelInvCountNotifRS",
            Self::HotelRateNotifRQ => "OTA_HotelRateNotifRS",
            Self::HotelAvailNotifRQ => "OTA_HotelAvailNotifRS",
        }
    }
}

/// Scan a SOAP body for one of the five known OTA root elements (spec
/// §4.7 step 2). `None` means the body must be rejected with a fault.
pub fn classify_root(body_xml: &str) -> Result<OtaRoot, CoreError> {
    let root = xmltree::parse(body_xml).map_err(|e| CoreError::classify(Some("XML_PARSE_ERROR"), &e.to_string()))?;
    // The body wrapper itself may be the root, or (when parsing a raw
    // inbound POST body rather than a full envelope) the OTA element is
    // the outermost node.
    let candidate = root.find("Body").map(|b| b).unwrap_or(&root);
    for child_name in std::iter::once(candidate.name.as_str()).chain(candidate.children.iter().map(|c| c.name.as_str())) {
        if let Some(kind) = OtaRoot::from_root_name(child_name) {
            return Ok(kind);
        }
    }
    Err(CoreError::classify(
        Some("VAL_UNKNOWN_ROOT"),
        "unrecognized OTA root element",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_roots() {
        let xml = r#"<OTA_HotelResNotifRQ HotelCode="001234" ResStatus="Cancel"/>"#;
        assert_eq!(classify_root(xml).unwrap(), OtaRoot::HotelResNotifRQ);
    }

    #[test]
    fn rejects_unknown_root() {
        let xml = r#"<SomeUnknownMessage/>"#;
        assert!(classify_root(xml).is_err());
    }

    #[test]
    fn response_root_tag_matches_request_kind() {
        assert_eq!(OtaRoot::HotelResNotifRQ.response_root_tag(), "OTA_HotelResNotifRS");
        assert_eq!(OtaRoot::HotelInvCountNotifRQ.message_kind(), MessageKind::Inventory);
    }
}
