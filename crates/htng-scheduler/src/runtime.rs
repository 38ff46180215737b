//! The runtime scheduler: one worker pool per queue polling pending and
//! due-for-retry jobs with bounded concurrency (spec §4.6), plus a stale
//! job recovery loop. Grounded on the teacher's `DispatchScheduler`
//! (`start`/`stop`/`is_running`, an `Arc<RwLock<bool>>` run flag, one
//! `tokio::spawn` interval loop per concern) and `StaleQueuedJobPoller`
//! for the recovery sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use htng_errors::CoreError;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::log_store::MessageLogStore;
use crate::queue::QueueKind;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub poll_interval: Duration,
    pub stale_poll_interval: Duration,
    /// How long a row may sit in `running` before it's considered stuck
    /// and reset to `pending` (restart recovery).
    pub stale_threshold: Duration,
    pub stale_batch_size: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_millis(500),
            stale_poll_interval: Duration::from_secs(60),
            stale_threshold: Duration::from_secs(15 * 60),
            stale_batch_size: 100,
        }
    }
}

/// Owns the four queue worker pools and the stale-job recovery loop.
/// Building the job (body XML, queue assignment) happens upstream; this
/// type only moves already-enqueued `MessageLogEntry` rows through
/// `Dispatcher::dispatch`.
pub struct Scheduler {
    config: SchedulerConfig,
    dispatcher: Arc<Dispatcher>,
    log_store: Arc<dyn MessageLogStore>,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, dispatcher: Arc<Dispatcher>, log_store: Arc<dyn MessageLogStore>) -> Self {
        Self { config, dispatcher, log_store, running: Arc::new(RwLock::new(false)) }
    }

    pub async fn start(&self) {
        if !self.config.enabled {
            info!("htng scheduler is disabled");
            return;
        }

        let mut running = self.running.write().await;
        if *running {
            warn!("htng scheduler already running");
            return;
        }
        *running = true;
        drop(running);

        info!(poll_interval_ms = self.config.poll_interval.as_millis(), "starting htng scheduler");

        for queue in QueueKind::ALL {
            self.spawn_queue_loop(queue);
        }
        self.spawn_stale_recovery_loop();
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        info!("htng scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    fn spawn_queue_loop(&self, queue: QueueKind) {
        let dispatcher = self.dispatcher.clone();
        let log_store = self.log_store.clone();
        let running = self.running.clone();
        let poll_interval = self.config.poll_interval;
        let permits = Arc::new(Semaphore::new(queue.spec().concurrency as usize));

        tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            loop {
                ticker.tick().await;
                if !*running.read().await {
                    break;
                }
                if let Err(e) = poll_and_dispatch(&dispatcher, &log_store, queue, &permits).await {
                    error!(queue = queue.as_str(), error = %e, "queue poll failed");
                }
            }
        });
    }

    fn spawn_stale_recovery_loop(&self) {
        let log_store = self.log_store.clone();
        let running = self.running.clone();
        let stale_poll_interval = self.config.stale_poll_interval;
        let stale_threshold = self.config.stale_threshold;
        let batch_size = self.config.stale_batch_size;

        tokio::spawn(async move {
            let mut ticker = interval(stale_poll_interval);
            loop {
                ticker.tick().await;
                if !*running.read().await {
                    break;
                }
                for queue in QueueKind::ALL {
                    if let Err(e) = recover_stale(&log_store, queue, stale_threshold, batch_size).await {
                        error!(queue = queue.as_str(), error = %e, "stale job recovery failed");
                    }
                }
            }
        });
    }
}

/// Pull up to the number of free permits worth of work and dispatch each
/// job on its own task, bounding in-flight jobs to the queue's
/// concurrency (spec §4.6 table).
async fn poll_and_dispatch(
    dispatcher: &Arc<Dispatcher>,
    log_store: &Arc<dyn MessageLogStore>,
    queue: QueueKind,
    permits: &Arc<Semaphore>,
) -> Result<(), CoreError> {
    let available = permits.available_permits() as u32;
    if available == 0 {
        return Ok(());
    }

    let mut jobs = log_store.fetch_pending(queue, available).await?;
    if (jobs.len() as u32) < available {
        let remaining = available - jobs.len() as u32;
        let due = log_store.fetch_due_for_retry(queue, Utc::now(), remaining).await?;
        jobs.extend(due);
    }

    for job in jobs {
        let permit = permits.clone().acquire_owned().await.expect("semaphore never closed");
        let dispatcher = dispatcher.clone();
        metrics::counter!("htng_scheduler.jobs_dispatched_total", "queue" => queue.as_str()).increment(1);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = dispatcher.dispatch(&job).await {
                warn!(job_id = %job.id, queue = queue.as_str(), error = %e, "dispatch returned an error (already recorded durably)");
            }
        });
    }
    Ok(())
}

async fn recover_stale(log_store: &Arc<dyn MessageLogStore>, queue: QueueKind, stale_threshold: Duration, limit: u32) -> Result<(), CoreError> {
    let stuck = log_store.fetch_stuck(queue, stale_threshold, limit).await?;
    if stuck.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = stuck.iter().map(|e| e.id.clone()).collect();
    log_store.reset_stuck(&ids).await?;
    metrics::counter!("htng_scheduler.stale_jobs_recovered_total", "queue" => queue.as_str()).increment(ids.len() as u64);
    info!(queue = queue.as_str(), count = ids.len(), "recovered stale running jobs");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_teacher_polling_cadence() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.stale_threshold, Duration::from_secs(15 * 60));
    }
}
