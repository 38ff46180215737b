//! Shared types for the HTNG channel messaging core.
//!
//! Every other crate in the workspace depends on this one for the message
//! kind enum, the message identifier type, and structured logging setup.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod logging;

/// Closed set of message kinds the core understands (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Inventory,
    Rates,
    Reservation,
    Restrictions,
    GroupBlock,
    /// Internal kind: a property mapping was created.
    MappingCreated,
    /// Internal kind: a property mapping was updated.
    MappingUpdated,
    /// Internal kind: a property mapping was deleted.
    MappingDeleted,
}

impl MessageKind {
    /// Whether this kind can appear on the wire (as opposed to an internal
    /// bookkeeping kind raised only for `SyncStatusChanged` observers).
    pub fn is_wire_kind(self) -> bool {
        matches!(
            self,
            Self::Inventory | Self::Rates | Self::Reservation | Self::Restrictions | Self::GroupBlock
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::Rates => "rates",
            Self::Reservation => "reservation",
            Self::Restrictions => "restrictions",
            Self::GroupBlock => "group_block",
            Self::MappingCreated => "mapping_created",
            Self::MappingUpdated => "mapping_updated",
            Self::MappingDeleted => "mapping_deleted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "inventory" => Some(Self::Inventory),
            "rates" => Some(Self::Rates),
            "reservation" => Some(Self::Reservation),
            "restrictions" => Some(Self::Restrictions),
            "group_block" => Some(Self::GroupBlock),
            "mapping_created" => Some(Self::MappingCreated),
            "mapping_updated" => Some(Self::MappingUpdated),
            "mapping_deleted" => Some(Self::MappingDeleted),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a message relative to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// A validated message identifier matching `^[A-Z]+_\d{8}_\d{6}_[A-Za-z0-9]+$`
/// (spec §6). Opaque on the wire; generated by the core on outbound,
/// echoed by the channel, treated as opaque on inbound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

fn message_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]+_\d{8}_\d{6}_[A-Za-z0-9]+$").unwrap())
}

#[derive(Debug, thiserror::Error)]
#[error("invalid message identifier: {0}")]
pub struct InvalidMessageId(String);

impl MessageId {
    /// Parse and validate an existing identifier (e.g. one echoed back by
    /// the channel).
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidMessageId> {
        let raw = raw.into();
        if message_id_pattern().is_match(&raw) {
            Ok(Self(raw))
        } else {
            Err(InvalidMessageId(raw))
        }
    }

    /// Generate a new identifier for an outbound message.
    ///
    /// Format: `PREFIX_YYYYMMDD_HHMMSS_SUFFIX`, suffix is an 8-character
    /// opaque alphanumeric tag.
    pub fn generate(prefix: &str, now: DateTime<Utc>) -> Self {
        let suffix: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(8)
            .collect::<String>()
            .to_uppercase();
        let id = format!(
            "{}_{}_{}",
            prefix.to_uppercase(),
            now.format("%Y%m%d_%H%M%S"),
            suffix
        );
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The channel's hotel code: 1-10 decimal digits (spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HotelCode(String);

#[derive(Debug, thiserror::Error)]
#[error("invalid hotel code: {0}")]
pub struct InvalidHotelCode(String);

impl HotelCode {
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidHotelCode> {
        let raw = raw.into();
        let valid = !raw.is_empty() && raw.len() <= 10 && raw.bytes().all(|b| b.is_ascii_digit());
        if valid {
            Ok(Self(raw))
        } else {
            Err(InvalidHotelCode(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HotelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Internal property identifier (numeric, owned by the PMS).
pub type PropertyId = i64;

/// A fixed-size byte cap used to bound storage of large audit fields.
/// Preserves the original size separately so truncation stays observable
/// (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Truncated {
    pub stored: String,
    pub original_len: usize,
    pub truncated: bool,
}

impl Truncated {
    pub fn cap(raw: &str, max_bytes: usize) -> Self {
        if raw.len() <= max_bytes {
            return Self {
                stored: raw.to_string(),
                original_len: raw.len(),
                truncated: false,
            };
        }
        let mut end = max_bytes;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            stored: raw[..end].to_string(),
            original_len: raw.len(),
            truncated: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_round_trip() {
        let id = MessageId::generate("HTNG", Utc::now());
        assert!(MessageId::parse(id.as_str().to_string()).is_ok());
    }

    #[test]
    fn message_id_rejects_malformed() {
        assert!(MessageId::parse("not-an-id").is_err());
        assert!(MessageId::parse("htng_20250601_120000_abcd1234").is_err()); // lowercase prefix
    }

    #[test]
    fn hotel_code_bounds() {
        assert!(HotelCode::parse("001234").is_ok());
        assert!(HotelCode::parse("12345678901").is_err()); // 11 digits
        assert!(HotelCode::parse("12A34").is_err());
        assert!(HotelCode::parse("").is_err());
    }

    #[test]
    fn truncated_preserves_original_len() {
        let t = Truncated::cap("hello world", 5);
        assert_eq!(t.stored, "hello");
        assert_eq!(t.original_len, 11);
        assert!(t.truncated);
    }
}
