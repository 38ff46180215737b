//! Per-(property, kind) dispatch lease (spec §4.6, §5: "dispatches are
//! strictly serialized via the lease — no two envelopes for the same
//! stream are in flight simultaneously").

use std::sync::Arc;

use dashmap::DashMap;
use htng_common::{MessageKind, PropertyId};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseKey {
    pub property_id: PropertyId,
    pub kind: MessageKind,
}

#[derive(Default)]
pub struct LeaseRegistry {
    locks: DashMap<LeaseKey, Arc<Mutex<()>>>,
}

/// Held for as long as the dispatch is in flight; dropping it releases
/// the lease for the next waiter on the same (property, kind).
pub type Lease = OwnedMutexGuard<()>;

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: LeaseKey) -> Arc<Mutex<()>> {
        self.locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Acquire the lease, suspending until any in-flight dispatch for the
    /// same (property, kind) completes.
    pub async fn acquire(&self, property_id: PropertyId, kind: MessageKind) -> Lease {
        let lock = self.lock_for(LeaseKey { property_id, kind });
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_stream_is_serialized() {
        let registry = Arc::new(LeaseRegistry::new());
        let concurrent = Arc::new(AtomicU32::new(0));
        let max_concurrent = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let registry = registry.clone();
            let concurrent = concurrent.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(tokio::spawn(async move {
                let _lease = registry.acquire(1, MessageKind::Inventory).await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_streams_run_concurrently() {
        let registry = Arc::new(LeaseRegistry::new());
        let _a = registry.acquire(1, MessageKind::Inventory).await;
        let acquired = tokio::time::timeout(Duration::from_millis(50), registry.acquire(2, MessageKind::Inventory)).await;
        assert!(acquired.is_ok());
    }
}
