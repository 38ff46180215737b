//! Drains `InboundWorkStore` against the repository (spec §4.7 step 5
//! continuation, §5 ordering). Shape mirrors `htng_scheduler::runtime`:
//! a fixed-size `Semaphore` sized off `QueueKind::InboundWork.spec()`,
//! one poll loop, per-(property, kind) serialization through the same
//! `LeaseRegistry` the outbound dispatcher uses for its own stream.

use std::sync::Arc;
use std::time::Duration;

use htng_repository::PmsRepository;
use htng_scheduler::lease::LeaseRegistry;
use htng_scheduler::queue::QueueKind;
use tokio::sync::{RwLock, Semaphore};
use tracing::{error, info, warn};

use crate::dispatch::apply_work_item;
use crate::work::InboundWorkStore;

pub struct InboundProcessorConfig {
    pub poll_interval: Duration,
    pub batch_limit: u32,
}

impl Default for InboundProcessorConfig {
    fn default() -> Self {
        let spec = QueueKind::InboundWork.spec();
        Self { poll_interval: Duration::from_millis(500), batch_limit: spec.concurrency }
    }
}

/// The inbound counterpart to `htng_scheduler::Scheduler`: one background
/// loop draining `InboundWorkStore`, applying each item against the
/// repository with per-(property, kind) ordering preserved.
pub struct InboundProcessor {
    config: InboundProcessorConfig,
    work: Arc<dyn InboundWorkStore>,
    repository: Arc<dyn PmsRepository>,
    leases: Arc<LeaseRegistry>,
    running: Arc<RwLock<bool>>,
}

impl InboundProcessor {
    pub fn new(config: InboundProcessorConfig, work: Arc<dyn InboundWorkStore>, repository: Arc<dyn PmsRepository>, leases: Arc<LeaseRegistry>) -> Self {
        Self { config, work, repository, leases, running: Arc::new(RwLock::new(false)) }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            warn!("inbound processor already running");
            return;
        }
        *running = true;
        drop(running);

        info!(poll_interval_ms = self.config.poll_interval.as_millis(), "starting inbound work processor");

        let work = self.work.clone();
        let repository = self.repository.clone();
        let leases = self.leases.clone();
        let running = self.running.clone();
        let poll_interval = self.config.poll_interval;
        let batch_limit = self.config.batch_limit;

        tokio::spawn(async move {
            let permits = Arc::new(Semaphore::new(batch_limit.max(1) as usize));
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                if !*running.read().await {
                    break;
                }
                poll_and_process(&work, &repository, &leases, &permits, batch_limit).await;
            }
        });
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}

async fn poll_and_process(
    work: &Arc<dyn InboundWorkStore>,
    repository: &Arc<dyn PmsRepository>,
    leases: &Arc<LeaseRegistry>,
    permits: &Arc<Semaphore>,
    batch_limit: u32,
) {
    let available = permits.available_permits() as u32;
    if available == 0 {
        return;
    }

    let items = match work.fetch_pending(available.min(batch_limit)).await {
        Ok(items) => items,
        Err(e) => {
            error!(error = %e, "failed to fetch pending inbound work items");
            return;
        }
    };

    for item in items {
        let Ok(permit) = permits.clone().try_acquire_owned() else {
            break;
        };
        let work = work.clone();
        let repository = repository.clone();
        let leases = leases.clone();

        tokio::spawn(async move {
            let _permit = permit;
            // Spec §5: arrival order within a single (hotel code, kind) is
            // preserved by acquiring the same per-stream lease the
            // outbound dispatcher serializes through.
            let _lease = leases.acquire(item.property_id, item.kind).await;

            if let Err(e) = work.mark_running(&item.id).await {
                warn!(error = %e, item_id = %item.id, "failed to mark inbound work item running");
            }

            match apply_work_item(repository.as_ref(), &item).await {
                Ok(()) => {
                    if let Err(e) = work.mark_completed(&item.id).await {
                        error!(error = %e, item_id = %item.id, "failed to mark inbound work item completed");
                    }
                    metrics::counter!("htng_inbound.work_items_applied_total", "kind" => item.kind.as_str()).increment(1);
                    info!(item_id = %item.id, kind = %item.kind.as_str(), "applied inbound work item");
                }
                Err(e) => {
                    if let Err(mark_err) = work.mark_failed(&item.id, &e.message).await {
                        error!(error = %mark_err, item_id = %item.id, "failed to mark inbound work item failed");
                    }
                    metrics::counter!("htng_inbound.work_items_failed_total", "kind" => item.kind.as_str()).increment(1);
                    warn!(error = %e, item_id = %item.id, "failed to apply inbound work item");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_batch_limit_matches_inbound_work_queue_concurrency() {
        let config = InboundProcessorConfig::default();
        assert_eq!(config.batch_limit, QueueKind::InboundWork.spec().concurrency);
    }
}
