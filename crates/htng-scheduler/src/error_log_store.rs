//! Persistence contract for the error log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use htng_errors::CoreError;

use crate::error_log::ErrorLogEntry;

#[async_trait]
pub trait ErrorLogStore: Send + Sync {
    async fn insert(&self, entry: ErrorLogEntry) -> Result<(), CoreError>;

    /// Rows still awaiting an operator, oldest first, capped at `limit`.
    async fn fetch_unresolved(&self, limit: u32) -> Result<Vec<ErrorLogEntry>, CoreError>;

    /// Record manual resolution: who resolved it, and when.
    async fn resolve(&self, id: &str, now: DateTime<Utc>, resolved_by: &str) -> Result<(), CoreError>;

    async fn init_schema(&self) -> Result<(), CoreError>;
}
