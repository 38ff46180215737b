//! Sync-state store and observer bus (spec §4.5, component C5).
//!
//! [`status`] holds the pure `SyncStatus` state machine, [`store`] the
//! persistence contract (with [`sqlite`] and [`postgres`] backends), and
//! [`observer`] the `SyncStatusChanged` event bus. [`service`] wires the
//! three together behind per-row serialization.

pub mod observer;
pub mod postgres;
pub mod service;
pub mod sqlite;
pub mod status;
pub mod store;

pub use observer::{ChangeType, EventBus, NoOpSyncObserver, SyncObserver, SyncStatusChanged};
pub use postgres::PostgresSyncStatusStore;
pub use service::SyncStatusService;
pub use sqlite::SqliteSyncStatusStore;
pub use status::{success_rate, EntityType, SyncState, SyncStatus, SyncStatusKey};
pub use store::SyncStatusStore;
