//! Append-only inbound message history (spec §3 ownership, §4.7 steps
//! 3-4): fingerprint dedup and the terminal ack replayed for a duplicate.
//! Shape mirrors `htng-scheduler`'s message log — one row per inbound
//! attempt, capped raw body, a `parse_row` helper, millis timestamps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use htng_common::{HotelCode, MessageKind, PropertyId, Truncated};
use htng_errors::CoreError;
use serde::{Deserialize, Serialize};

/// Cap on the raw XML stored per history row (spec §4.7 step 4).
pub const MAX_STORED_BODY_BYTES: usize = 65_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Pending,
    Completed,
    Failed,
}

impl HistoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this status is terminal — a duplicate fingerprint arriving
    /// while the row is in this state gets the stored ack replayed
    /// rather than being re-enqueued (spec §4.7 step 3).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHistoryEntry {
    pub id: String,
    pub property_id: PropertyId,
    pub hotel_code: HotelCode,
    pub kind: MessageKind,
    pub fingerprint: String,
    pub raw_xml: Truncated,
    pub status: HistoryStatus,
    /// The acknowledgment envelope sent for this row, replayed verbatim
    /// on a duplicate submission.
    pub ack_xml: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl MessageHistoryEntry {
    pub fn new(id: String, property_id: PropertyId, hotel_code: HotelCode, kind: MessageKind, fingerprint: String, raw_xml: Truncated, now: DateTime<Utc>) -> Self {
        Self {
            id,
            property_id,
            hotel_code,
            kind,
            fingerprint,
            raw_xml,
            status: HistoryStatus::Pending,
            ack_xml: None,
            error_message: None,
            created_at: now,
            closed_at: None,
        }
    }
}

#[async_trait]
pub trait MessageHistoryStore: Send + Sync {
    async fn insert_pending(&self, entry: MessageHistoryEntry) -> Result<(), CoreError>;

    /// The most recent history row for this (hotel code, kind,
    /// fingerprint) triple, if any — used for the dedup check.
    async fn find_by_fingerprint(&self, hotel_code: &HotelCode, kind: MessageKind, fingerprint: &str) -> Result<Option<MessageHistoryEntry>, CoreError>;

    async fn mark_completed(&self, id: &str, now: DateTime<Utc>, ack_xml: &str) -> Result<(), CoreError>;

    async fn mark_failed(&self, id: &str, now: DateTime<Utc>, error_message: &str, ack_xml: Option<&str>) -> Result<(), CoreError>;

    async fn init_schema(&self) -> Result<(), CoreError>;
}
