//! High-level sync-status API: serializes mutations to a single row
//! (spec §4.5 — "row-level exclusive lock or equivalent; concurrent
//! mutations across rows are allowed") and fans the resulting transition
//! out to the event bus after every persisted write.

use std::sync::Arc;

use dashmap::DashMap;
use htng_errors::CoreError;
use tokio::sync::Mutex;

use crate::observer::{ChangeType, EventBus, SyncStatusChanged};
use crate::status::{SyncStatus, SyncStatusKey};
use crate::store::SyncStatusStore;

/// Owns the per-row lock table, the durable store and the observer bus.
/// Every public method here is the only sanctioned way to mutate a
/// `SyncStatus` row once it is under management.
pub struct SyncStatusService {
    store: Arc<dyn SyncStatusStore>,
    bus: EventBus,
    row_locks: DashMap<SyncStatusKey, Arc<Mutex<()>>>,
}

impl SyncStatusService {
    pub fn new(store: Arc<dyn SyncStatusStore>, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            row_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, key: &SyncStatusKey) -> Arc<Mutex<()>> {
        self.row_locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn with_row<F>(&self, key: &SyncStatusKey, retry_cap: u32, auto_retry: bool, change_type: ChangeType, context: Option<String>, mutate: F) -> Result<SyncStatus, CoreError>
    where
        F: FnOnce(&mut SyncStatus),
    {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let mut status = self.store.get_or_create(key, retry_cap, auto_retry).await?;
        let previous_state = status.state;
        mutate(&mut status);
        self.store.save(&status).await?;

        self.bus
            .publish(SyncStatusChanged {
                snapshot: status.clone(),
                previous_state,
                change_type,
                context,
            })
            .await;

        Ok(status)
    }

    pub async fn begin_running(&self, key: &SyncStatusKey, retry_cap: u32, auto_retry: bool, now: chrono::DateTime<chrono::Utc>) -> Result<SyncStatus, CoreError> {
        self.with_row(key, retry_cap, auto_retry, ChangeType::BeganRunning, None, |s| s.begin_running(now)).await
    }

    pub async fn complete(&self, key: &SyncStatusKey, retry_cap: u32, auto_retry: bool, now: chrono::DateTime<chrono::Utc>, records_processed: u64, records_total: u64) -> Result<SyncStatus, CoreError> {
        self.with_row(key, retry_cap, auto_retry, ChangeType::Completed, None, |s| s.complete(now, records_processed, records_total)).await
    }

    pub async fn fail(&self, key: &SyncStatusKey, retry_cap: u32, auto_retry: bool, now: chrono::DateTime<chrono::Utc>, error: &CoreError) -> Result<SyncStatus, CoreError> {
        let change_type = if error.kind.can_retry() { ChangeType::Retried } else { ChangeType::Failed };
        let context = Some(error.message.clone());
        self.with_row(key, retry_cap, auto_retry, change_type, context, |s| s.fail(now, error)).await
    }

    pub async fn mark_new_change(&self, key: &SyncStatusKey, retry_cap: u32, auto_retry: bool) -> Result<SyncStatus, CoreError> {
        self.with_row(key, retry_cap, auto_retry, ChangeType::NewChangeDetected, None, |s| s.mark_new_change()).await
    }

    pub async fn deactivate(&self, key: &SyncStatusKey, retry_cap: u32) -> Result<SyncStatus, CoreError> {
        self.with_row(key, retry_cap, true, ChangeType::Deactivated, None, |s| s.deactivate()).await
    }

    pub async fn activate(&self, key: &SyncStatusKey, retry_cap: u32) -> Result<SyncStatus, CoreError> {
        self.with_row(key, retry_cap, false, ChangeType::Activated, None, |s| s.activate()).await
    }

    pub async fn force_pending_for_hotel_code_change(&self, key: &SyncStatusKey, retry_cap: u32, auto_retry: bool) -> Result<SyncStatus, CoreError> {
        self.with_row(key, retry_cap, auto_retry, ChangeType::HotelCodeChanged, None, |s| s.force_pending_for_hotel_code_change()).await
    }

    pub async fn list_due_for_retry(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<SyncStatus>, CoreError> {
        self.store.list_due_for_retry(now).await
    }

    pub async fn list_for_property(&self, property_id: htng_common::PropertyId) -> Result<Vec<SyncStatus>, CoreError> {
        self.store.list_for_property(property_id).await
    }
}
