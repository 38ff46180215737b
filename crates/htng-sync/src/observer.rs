//! The `SyncStatusChanged` domain event and its subscribable bus (spec
//! §4.5, §9). Observers are infallible by contract — the core must not
//! depend on broadcast succeeding, so the bus has nothing to propagate a
//! failure through.

use std::sync::Arc;

use async_trait::async_trait;

use crate::status::{SyncState, SyncStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    BeganRunning,
    Completed,
    Failed,
    Retried,
    NewChangeDetected,
    Activated,
    Deactivated,
    HotelCodeChanged,
}

#[derive(Debug, Clone)]
pub struct SyncStatusChanged {
    pub snapshot: SyncStatus,
    pub previous_state: SyncState,
    pub change_type: ChangeType,
    pub context: Option<String>,
}

/// Subscriber to `SyncStatusChanged` events. The config mirror and cache
/// invalidator described in spec §9 are ordinary implementations of this
/// trait, not lifecycle hooks wired into the state machine itself.
#[async_trait]
pub trait SyncObserver: Send + Sync {
    async fn on_sync_status_changed(&self, event: &SyncStatusChanged);
}

pub struct NoOpSyncObserver;

#[async_trait]
impl SyncObserver for NoOpSyncObserver {
    async fn on_sync_status_changed(&self, _event: &SyncStatusChanged) {}
}

#[derive(Default)]
pub struct EventBus {
    observers: Vec<Arc<dyn SyncObserver>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn SyncObserver>) {
        self.observers.push(observer);
    }

    pub async fn publish(&self, event: SyncStatusChanged) {
        for observer in &self.observers {
            observer.on_sync_status_changed(&event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{EntityType, SyncStatusKey};
    use htng_common::MessageKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver(Arc<AtomicUsize>);

    #[async_trait]
    impl SyncObserver for CountingObserver {
        async fn on_sync_status_changed(&self, _event: &SyncStatusChanged) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn bus_fans_out_to_every_subscriber() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(CountingObserver(counter.clone())));
        bus.subscribe(Arc::new(CountingObserver(counter.clone())));

        let key = SyncStatusKey {
            property_id: 1,
            kind: MessageKind::Inventory,
            entity_type: EntityType::RoomType,
            entity_id: "KING".to_string(),
        };
        let snapshot = SyncStatus::new(key, 3, true);
        bus.publish(SyncStatusChanged {
            previous_state: snapshot.state,
            snapshot,
            change_type: ChangeType::BeganRunning,
            context: None,
        })
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
