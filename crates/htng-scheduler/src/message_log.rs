//! The durable message log (spec §4.5 "Ownership": message logs are
//! append-only, owned by C6 for outbound). One row per dispatch attempt;
//! the row carries enough of the already-built, already-validated OTA
//! body to survive a restart and be retried. Shape mirrors the teacher's
//! outbox item (`pending`/`running`/`completed`/`failed`, retry_count,
//! payload, error_message) rather than inventing a new one.

use chrono::{DateTime, Utc};
use htng_common::{Direction, HotelCode, MessageKind, PropertyId};
use htng_errors::ErrorKind;
use htng_sync::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::queue::QueueKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl LogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Delta,
    FullSync,
}

/// One outbound job, queued and durably logged. `entity_type`/`entity_id`
/// double as the `SyncStatusKey` the dispatcher mutates on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub id: String,
    /// The wire `MessageID` this job was sent under, once it has been
    /// sent. Distinct from `id` (the job's own identifier, assigned at
    /// enqueue time, before a message identifier exists) — unique in the
    /// message log once populated (spec §3).
    pub message_id: Option<String>,
    pub direction: Direction,
    pub property_id: PropertyId,
    pub hotel_code: HotelCode,
    pub kind: MessageKind,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub queue: QueueKind,
    pub sync_mode: SyncMode,
    /// Already-validated OTA body (C3/C4 output); the dispatcher only
    /// wraps it in an envelope, it never rebuilds or re-validates it.
    pub body_xml: String,
    pub action: Option<String>,
    pub status: LogStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub response_body: Option<String>,
    pub duration_ms: Option<u64>,
    pub metadata: Option<JsonValue>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageLogEntry {
    pub fn new(
        id: String,
        property_id: PropertyId,
        hotel_code: HotelCode,
        kind: MessageKind,
        entity_type: EntityType,
        entity_id: String,
        queue: QueueKind,
        sync_mode: SyncMode,
        body_xml: String,
        action: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            message_id: None,
            direction: Direction::Outbound,
            property_id,
            hotel_code,
            kind,
            entity_type,
            entity_id,
            queue,
            sync_mode,
            body_xml,
            action,
            status: LogStatus::Pending,
            retry_count: 0,
            error_message: None,
            error_kind: None,
            response_body: None,
            duration_ms: None,
            metadata: None,
            opened_at: None,
            closed_at: None,
            next_retry_at: None,
            created_at: now,
        }
    }
}
