//! The error log (spec §3 "Error log"): one row per classified failure,
//! independent of whatever queue or work item raised it. Observed by
//! alerting collaborators, so a row is written the moment a `CoreError`
//! is classified rather than only on terminal exhaustion — unlike the
//! message/history logs, which track one durable job to completion.

use chrono::{DateTime, Utc};
use htng_errors::{CoreError, ErrorKind, Severity};
use serde::{Deserialize, Serialize};

/// One row in the error log. `message_id` links back to the message log
/// or history row the failure belongs to, when one exists — an inbound
/// authentication failure has no history row yet (spec §8 scenario 4),
/// so the link is best-effort, not a foreign key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub id: String,
    pub message_id: Option<String>,
    pub error_kind: ErrorKind,
    pub error_code: Option<String>,
    pub severity: Severity,
    pub message: String,
    pub stack: Option<String>,
    pub source_context: Option<String>,
    pub can_retry: bool,
    pub retry_delay_seconds: Option<u32>,
    pub manual_intervention: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ErrorLogEntry {
    /// Build a row from a classified `CoreError`. `manual_intervention`
    /// follows the kind's retry policy: a non-retryable kind needs an
    /// operator to look at it, a retryable one doesn't unless it keeps
    /// failing (the scheduler doesn't track "keeps failing" here, so
    /// this is the spec's resting default, not the final word).
    pub fn from_error(id: String, message_id: Option<String>, source_context: Option<String>, error: &CoreError, now: DateTime<Utc>) -> Self {
        Self {
            id,
            message_id,
            error_kind: error.kind,
            error_code: error.code.clone(),
            severity: error.severity,
            message: error.message.clone(),
            stack: error.cause.clone(),
            source_context,
            can_retry: error.can_retry,
            retry_delay_seconds: error.retry_delay_seconds,
            manual_intervention: !error.can_retry,
            resolved_at: None,
            resolved_by: None,
            created_at: now,
        }
    }
}
