//! Persistence contract for the message log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use htng_errors::{CoreError, ErrorKind};
use std::time::Duration;

use crate::message_log::MessageLogEntry;
use crate::queue::QueueKind;

#[async_trait]
pub trait MessageLogStore: Send + Sync {
    async fn enqueue(&self, entry: MessageLogEntry) -> Result<(), CoreError>;

    /// Pending rows for `queue`, oldest first, capped at `limit`.
    async fn fetch_pending(&self, queue: QueueKind, limit: u32) -> Result<Vec<MessageLogEntry>, CoreError>;

    /// Rows in `failed` with `next_retry_at <= now`.
    async fn fetch_due_for_retry(&self, queue: QueueKind, now: DateTime<Utc>, limit: u32) -> Result<Vec<MessageLogEntry>, CoreError>;

    /// Rows stuck in `running` past the queue's job timeout — restart
    /// recovery (mirrors the teacher's `fetch_stuck_items`).
    async fn fetch_stuck(&self, queue: QueueKind, timeout: Duration, limit: u32) -> Result<Vec<MessageLogEntry>, CoreError>;

    async fn mark_running(&self, id: &str, now: DateTime<Utc>) -> Result<(), CoreError>;

    /// Close a successful attempt. `message_id` is the wire identifier the
    /// job was actually sent under, `response_body` the raw channel
    /// response, `duration_ms` the round-trip time — all computed by the
    /// dispatcher but otherwise not recorded anywhere (spec §3).
    #[allow(clippy::too_many_arguments)]
    async fn mark_completed(
        &self,
        id: &str,
        now: DateTime<Utc>,
        message_id: &str,
        response_body: &str,
        duration_ms: u64,
    ) -> Result<(), CoreError>;

    #[allow(clippy::too_many_arguments)]
    async fn mark_failed(
        &self,
        id: &str,
        now: DateTime<Utc>,
        message_id: Option<&str>,
        error_message: &str,
        error_kind: ErrorKind,
        response_body: Option<&str>,
        duration_ms: u64,
        retry_count: u32,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError>;

    async fn reset_stuck(&self, ids: &[String]) -> Result<(), CoreError>;

    async fn init_schema(&self) -> Result<(), CoreError>;
}
