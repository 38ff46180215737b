//! Durable persistence for `SyncStatus` rows (spec §6: one key-value
//! table, unique on the entity tuple).

use async_trait::async_trait;
use htng_common::PropertyId;
use htng_errors::CoreError;

use crate::status::{SyncStatus, SyncStatusKey};

#[async_trait]
pub trait SyncStatusStore: Send + Sync {
    /// Fetch the row for `key`, creating it in `pending` if absent.
    async fn get_or_create(&self, key: &SyncStatusKey, retry_cap: u32, auto_retry: bool) -> Result<SyncStatus, CoreError>;

    /// Persist the full row, overwriting any prior state for its key.
    async fn save(&self, status: &SyncStatus) -> Result<(), CoreError>;

    async fn list_for_property(&self, property_id: PropertyId) -> Result<Vec<SyncStatus>, CoreError>;

    /// Rows due for retry (`state = failed` and `next_retry_at <= now`),
    /// read back across restarts by the scheduler.
    async fn list_due_for_retry(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<SyncStatus>, CoreError>;

    async fn init_schema(&self) -> Result<(), CoreError>;
}
