//! The sync-status row and its pure state machine (spec §3, §4.5). Kept
//! free of any storage or event-bus concern so the transitions themselves
//! are trivially unit-testable.

use chrono::{DateTime, Duration, Utc};
use htng_common::{MessageKind, PropertyId};
use htng_errors::{exponential_backoff_seconds, CoreError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Running,
    Completed,
    Failed,
    /// Terminal administrative state: retries suppressed (mapping deactivated).
    Inactive,
    /// Terminal administrative state: retry cap exhausted.
    Error,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Inactive => "inactive",
            Self::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "inactive" => Some(Self::Inactive),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Property,
    RoomType,
    RatePlan,
    Reservation,
    Restriction,
    GroupBlock,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::RoomType => "room_type",
            Self::RatePlan => "rate_plan",
            Self::Reservation => "reservation",
            Self::Restriction => "restriction",
            Self::GroupBlock => "group_block",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "property" => Some(Self::Property),
            "room_type" => Some(Self::RoomType),
            "rate_plan" => Some(Self::RatePlan),
            "reservation" => Some(Self::Reservation),
            "restriction" => Some(Self::Restriction),
            "group_block" => Some(Self::GroupBlock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncStatusKey {
    pub property_id: PropertyId,
    pub kind: MessageKind,
    pub entity_type: EntityType,
    pub entity_id: String,
}

/// One row per `SyncStatusKey` (spec §3). `change_log` is an opaque,
/// append-only audit trail of transition descriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub key: SyncStatusKey,
    pub state: SyncState,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub retry_count: u32,
    pub retry_cap: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub records_processed: u64,
    pub records_total: u64,
    pub success_rate: f64,
    pub auto_retry: bool,
    pub change_log: Vec<String>,
}

/// `round(processed / total * 100, 2)`, `0` when `total` is zero.
pub fn success_rate(records_processed: u64, records_total: u64) -> f64 {
    if records_total == 0 {
        return 0.0;
    }
    let ratio = records_processed as f64 / records_total as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

impl SyncStatus {
    pub fn new(key: SyncStatusKey, retry_cap: u32, auto_retry: bool) -> Self {
        Self {
            key,
            state: SyncState::Pending,
            last_attempt: None,
            last_success: None,
            attempt_count: 0,
            retry_count: 0,
            retry_cap,
            next_retry_at: None,
            last_error: None,
            records_processed: 0,
            records_total: 0,
            success_rate: 0.0,
            auto_retry,
            change_log: Vec::new(),
        }
    }

    fn record(&mut self, description: impl Into<String>) {
        self.change_log.push(description.into());
    }

    /// `pending → running` (also valid from `failed`, for a retry).
    pub fn begin_running(&mut self, now: DateTime<Utc>) {
        self.state = SyncState::Running;
        self.last_attempt = Some(now);
        self.attempt_count += 1;
        self.last_error = None;
        self.record(format!("-> running at {now}"));
    }

    /// `running → completed`.
    pub fn complete(&mut self, now: DateTime<Utc>, records_processed: u64, records_total: u64) {
        self.state = SyncState::Completed;
        self.last_success = Some(now);
        self.retry_count = 0;
        self.next_retry_at = None;
        self.records_processed = records_processed;
        self.records_total = records_total;
        self.success_rate = success_rate(records_processed, records_total);
        self.record(format!("-> completed at {now}, success_rate={}", self.success_rate));
    }

    /// `running → failed`, moving to the terminal `error` state if the
    /// error isn't retryable, the cap is reached, or auto-retry is off.
    pub fn fail(&mut self, now: DateTime<Utc>, error: &CoreError) {
        self.last_error = Some(error.message.clone());

        let can_retry = error.kind.can_retry() && self.retry_count < self.retry_cap && self.auto_retry;
        if can_retry {
            self.state = SyncState::Failed;
            self.retry_count += 1;
            let base = error.kind.default_retry_delay_seconds().unwrap_or(60);
            let delay = exponential_backoff_seconds(base, self.retry_count);
            self.next_retry_at = Some(now + Duration::seconds(delay as i64));
            self.record(format!("-> failed at {now}, retry {} scheduled at {:?}", self.retry_count, self.next_retry_at));
        } else {
            self.state = SyncState::Error;
            self.next_retry_at = None;
            self.record(format!("-> error at {now} (retries exhausted or non-retryable: {})", error.kind));
        }
    }

    /// `completed → pending` on a new domain change.
    pub fn mark_new_change(&mut self) {
        if self.state == SyncState::Completed {
            self.state = SyncState::Pending;
            self.record("completed -> pending (new change)");
        }
    }

    /// Mapping deactivation: auto-retry is suppressed.
    pub fn deactivate(&mut self) {
        self.state = SyncState::Inactive;
        self.auto_retry = false;
        self.next_retry_at = None;
        self.record("-> inactive (mapping deactivated)");
    }

    /// Mapping activation: existing rows become eligible again.
    pub fn activate(&mut self) {
        if self.state == SyncState::Inactive {
            self.state = SyncState::Pending;
            self.auto_retry = true;
            self.record("inactive -> pending (mapping activated)");
        }
    }

    /// Hotel-code change for the owning mapping: force back to `pending`
    /// so the next sync resends.
    pub fn force_pending_for_hotel_code_change(&mut self) {
        self.state = SyncState::Pending;
        self.retry_count = 0;
        self.next_retry_at = None;
        self.record("-> pending (hotel code changed)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use htng_errors::ErrorKind;

    fn key() -> SyncStatusKey {
        SyncStatusKey {
            property_id: 1,
            kind: MessageKind::Inventory,
            entity_type: EntityType::RoomType,
            entity_id: "KING".to_string(),
        }
    }

    #[test]
    fn lifecycle_pending_running_completed() {
        let mut status = SyncStatus::new(key(), 3, true);
        assert_eq!(status.state, SyncState::Pending);

        let now = Utc::now();
        status.begin_running(now);
        assert_eq!(status.state, SyncState::Running);
        assert_eq!(status.attempt_count, 1);

        status.complete(now, 5, 5);
        assert_eq!(status.state, SyncState::Completed);
        assert_eq!(status.retry_count, 0);
        assert!(status.next_retry_at.is_none());
        assert_eq!(status.success_rate, 100.0);
    }

    #[test]
    fn success_rate_formula_matches_spec() {
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(success_rate(1, 3), 33.33);
        assert_eq!(success_rate(2, 3), 66.67);
    }

    #[test]
    fn retryable_failure_schedules_next_retry_and_stays_bounded() {
        let mut status = SyncStatus::new(key(), 2, true);
        let now = Utc::now();
        status.begin_running(now);

        let timeout = CoreError::classify(None, "request timeout after 60s");
        assert_eq!(timeout.kind, ErrorKind::Timeout);

        status.fail(now, &timeout);
        assert_eq!(status.state, SyncState::Failed);
        assert_eq!(status.retry_count, 1);
        assert!(status.retry_count <= status.retry_cap);
        assert_eq!(status.next_retry_at, Some(now + Duration::seconds(60)));

        status.begin_running(now + Duration::seconds(60));
        status.fail(now, &timeout);
        assert_eq!(status.retry_count, 2);

        // Cap reached: next failure moves to the terminal `error` state,
        // never back to `running`.
        status.begin_running(now + Duration::seconds(180));
        status.fail(now, &timeout);
        assert_eq!(status.state, SyncState::Error);
        assert!(status.next_retry_at.is_none());
    }

    #[test]
    fn non_retryable_failure_goes_straight_to_error() {
        let mut status = SyncStatus::new(key(), 5, true);
        let now = Utc::now();
        status.begin_running(now);
        let validation_error = CoreError::classify(Some("VAL001"), "required field missing");
        status.fail(now, &validation_error);
        assert_eq!(status.state, SyncState::Error);
    }

    #[test]
    fn deactivation_suppresses_auto_retry() {
        let mut status = SyncStatus::new(key(), 5, true);
        status.deactivate();
        assert_eq!(status.state, SyncState::Inactive);
        assert!(!status.auto_retry);
        status.activate();
        assert_eq!(status.state, SyncState::Pending);
        assert!(status.auto_retry);
    }

    #[test]
    fn completed_returns_to_pending_on_new_change() {
        let mut status = SyncStatus::new(key(), 5, true);
        let now = Utc::now();
        status.begin_running(now);
        status.complete(now, 1, 1);
        status.mark_new_change();
        assert_eq!(status.state, SyncState::Pending);
    }

    #[test]
    fn hotel_code_change_forces_pending() {
        let mut status = SyncStatus::new(key(), 5, true);
        let now = Utc::now();
        status.begin_running(now);
        status.fail(now, &CoreError::classify(None, "connection reset"));
        status.force_pending_for_hotel_code_change();
        assert_eq!(status.state, SyncState::Pending);
        assert_eq!(status.retry_count, 0);
    }
}
