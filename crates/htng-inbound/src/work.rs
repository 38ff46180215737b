//! Inbound work items (spec §4.7 step 5): one row per accepted inbound
//! message, queued on `QueueKind::InboundWork` and drained by the
//! processor in `process.rs`. Shape mirrors `htng-scheduler`'s
//! `MessageLogEntry`, but there's no `entity_type`/`entity_id`/`sync_mode`
//! to carry — inbound work is applied against the repository directly,
//! not tracked through `SyncStatus`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use htng_common::{HotelCode, MessageKind, PropertyId};
use htng_errors::CoreError;
use htng_xml::reservation::ReservationStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl WorkStatus {
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

/// One accepted inbound message, queued for processing. `reservation_status`
/// is set only for `MessageKind::Reservation` — it's the sub-classification
/// (Cancel/Modify/new-booking) spec §4.7 step 5 drives the repository call
/// from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundWorkItem {
    pub id: String,
    pub property_id: PropertyId,
    pub hotel_code: HotelCode,
    pub kind: MessageKind,
    pub reservation_status: Option<ReservationStatusWire>,
    pub body_xml: String,
    pub history_id: String,
    pub status: WorkStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A wire-stable mirror of `htng_xml::reservation::ReservationStatus` —
/// that type has no `Serialize` derive of its own since it's purely a
/// parse result, so work items store this instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatusWire {
    Confirmed,
    Cancelled,
    Modified,
}

impl From<ReservationStatus> for ReservationStatusWire {
    fn from(status: ReservationStatus) -> Self {
        match status {
            ReservationStatus::Confirmed => Self::Confirmed,
            ReservationStatus::Cancelled => Self::Cancelled,
            ReservationStatus::Modified => Self::Modified,
        }
    }
}

impl ReservationStatusWire {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Modified => "modified",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "modified" => Some(Self::Modified),
            _ => None,
        }
    }
}

impl InboundWorkItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        property_id: PropertyId,
        hotel_code: HotelCode,
        kind: MessageKind,
        reservation_status: Option<ReservationStatusWire>,
        body_xml: String,
        history_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            property_id,
            hotel_code,
            kind,
            reservation_status,
            body_xml,
            history_id,
            status: WorkStatus::Pending,
            retry_count: 0,
            error_message: None,
            created_at: now,
        }
    }
}

#[async_trait]
pub trait InboundWorkStore: Send + Sync {
    async fn enqueue(&self, item: InboundWorkItem) -> Result<(), CoreError>;

    /// Up to `limit` pending items, oldest first — FIFO within a single
    /// poll, per-stream ordering is enforced separately by the lease.
    async fn fetch_pending(&self, limit: u32) -> Result<Vec<InboundWorkItem>, CoreError>;

    async fn mark_running(&self, id: &str) -> Result<(), CoreError>;

    async fn mark_completed(&self, id: &str) -> Result<(), CoreError>;

    async fn mark_failed(&self, id: &str, error_message: &str) -> Result<(), CoreError>;

    async fn init_schema(&self) -> Result<(), CoreError>;
}
