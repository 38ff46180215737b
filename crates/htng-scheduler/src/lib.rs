//! C6: the outbound dispatch scheduler (spec §4.6). Owns the durable
//! message log, the per-(property, kind) lease, the per-property
//! authentication circuit breaker, and the worker pools that drive
//! already-validated, already-built OTA bodies (handed to it by C3/C4)
//! through the channel transport. This crate never builds or validates
//! XML itself.

pub mod batch;
pub mod circuit_breaker;
pub mod dispatcher;
pub mod error_log;
pub mod error_log_postgres;
pub mod error_log_sqlite;
pub mod error_log_store;
pub mod lease;
pub mod log_store;
pub mod message_log;
pub mod postgres;
pub mod queue;
pub mod runtime;
pub mod sqlite;
pub mod transport;

pub use batch::{chunk, DEFAULT_BATCH_SIZE};
pub use circuit_breaker::{BreakerState, CircuitBreakerConfig, PropertyCircuitBreakerRegistry};
pub use dispatcher::{CredentialSource, Dispatcher};
pub use error_log::ErrorLogEntry;
pub use error_log_postgres::PostgresErrorLogStore;
pub use error_log_sqlite::SqliteErrorLogStore;
pub use error_log_store::ErrorLogStore;
pub use lease::{Lease, LeaseKey, LeaseRegistry};
pub use log_store::MessageLogStore;
pub use message_log::{LogStatus, MessageLogEntry, SyncMode};
pub use postgres::PostgresMessageLogStore;
pub use queue::{QueueKind, QueueSpec};
pub use runtime::{Scheduler, SchedulerConfig};
pub use sqlite::SqliteMessageLogStore;
pub use transport::Transport;

use chrono::Utc;
use htng_common::{HotelCode, MessageKind, PropertyId};
use htng_errors::CoreError;
use htng_sync::EntityType;
use std::sync::Arc;
use uuid::Uuid;

/// Build and durably enqueue one outbound job. The body must already be
/// built and validated (C3/C4); this only assigns a queue and persists
/// the row so the worker pool for that queue picks it up.
pub async fn enqueue_job(
    log_store: &Arc<dyn MessageLogStore>,
    property_id: PropertyId,
    hotel_code: HotelCode,
    kind: MessageKind,
    entity_type: EntityType,
    entity_id: String,
    queue: QueueKind,
    sync_mode: SyncMode,
    body_xml: String,
    action: Option<String>,
) -> Result<String, CoreError> {
    let id = Uuid::new_v4().to_string();
    let entry = MessageLogEntry::new(id.clone(), property_id, hotel_code, kind, entity_type, entity_id, queue, sync_mode, body_xml, action, Utc::now());
    log_store.enqueue(entry).await?;
    Ok(id)
}

/// The default outbound queue for a message kind (spec §4.6: inventory,
/// rates, and restrictions are high/outbound priority; reservations and
/// group blocks route through outbound too — inbound-work and low are
/// reserved for C7 work items and housekeeping sweeps respectively).
pub fn default_queue_for(kind: MessageKind) -> QueueKind {
    match kind {
        MessageKind::Inventory | MessageKind::Restrictions => QueueKind::High,
        MessageKind::Rates | MessageKind::Reservation | MessageKind::GroupBlock => QueueKind::Outbound,
        MessageKind::MappingCreated | MessageKind::MappingUpdated | MessageKind::MappingDeleted => QueueKind::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_queue_routes_high_priority_streams_first() {
        assert_eq!(default_queue_for(MessageKind::Inventory), QueueKind::High);
        assert_eq!(default_queue_for(MessageKind::Restrictions), QueueKind::High);
        assert_eq!(default_queue_for(MessageKind::Rates), QueueKind::Outbound);
        assert_eq!(default_queue_for(MessageKind::Reservation), QueueKind::Outbound);
        assert_eq!(default_queue_for(MessageKind::MappingCreated), QueueKind::Low);
    }
}
