//! The dispatch algorithm (spec §4.6): acquire a lease, open the log
//! entry, send, classify, close the log entry, transition sync status.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use htng_common::MessageId;
use htng_envelope::{build_request, parse_response, WsseCredentials};
use htng_errors::{CoreError, ErrorKind};
use htng_sync::{SyncStatusKey, SyncStatusService};
use tracing::{info, warn};
use uuid::Uuid;

use crate::circuit_breaker::PropertyCircuitBreakerRegistry;
use crate::error_log::ErrorLogEntry;
use crate::error_log_store::ErrorLogStore;
use crate::lease::LeaseRegistry;
use crate::log_store::MessageLogStore;
use crate::message_log::MessageLogEntry;
use crate::transport::Transport;

/// Resolves the WSSE credentials for a property. Implemented by the host
/// (typically backed by `htng-config`'s property mapping store).
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credentials_for(&self, property_id: htng_common::PropertyId) -> Result<WsseCredentials, CoreError>;
}

pub struct Dispatcher {
    pub lease: Arc<LeaseRegistry>,
    pub log_store: Arc<dyn MessageLogStore>,
    pub error_log: Arc<dyn ErrorLogStore>,
    pub sync_status: Arc<SyncStatusService>,
    pub circuit_breaker: Arc<PropertyCircuitBreakerRegistry>,
    pub transport: Arc<dyn Transport>,
    pub credentials: Arc<dyn CredentialSource>,
    pub message_id_prefix: String,
}

/// What a dispatch attempt learned before it could be classified as a
/// success or failure — carried separately from the `Result` so the
/// caller can close the log entry with the wire `message_id`, response
/// body, and timing even on a failure partway through the send.
struct Attempt {
    message_id: Option<String>,
    response_body: Option<String>,
    duration_ms: u64,
}

impl Dispatcher {
    /// Run one entry to completion (success, retryable failure, or
    /// terminal error). Returns the classified outcome for callers that
    /// want to log/aggregate it; errors are already recorded durably, so
    /// a batch driver can ignore the `Err` case and move to the next job.
    pub async fn dispatch(&self, entry: &MessageLogEntry) -> Result<(), CoreError> {
        let retry_cap = entry.queue.spec().max_retries;
        let key = SyncStatusKey {
            property_id: entry.property_id,
            kind: entry.kind,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id.clone(),
        };

        if entry.retry_count > 0 && !self.circuit_breaker.allow_auto_retry(entry.property_id) {
            warn!(property_id = entry.property_id, kind = %entry.kind, "circuit open, skipping retry");
            return Ok(());
        }

        let _lease = self.lease.acquire(entry.property_id, entry.kind).await;

        let now = Utc::now();
        self.log_store.mark_running(&entry.id, now).await?;
        self.sync_status.begin_running(&key, retry_cap, true, now).await?;

        let (attempt, outcome) = self.send_and_classify(entry).await;

        match outcome {
            Ok(()) => {
                let completed_at = Utc::now();
                let message_id = attempt.message_id.as_deref().unwrap_or(&entry.id);
                let response_body = attempt.response_body.as_deref().unwrap_or_default();
                self.log_store.mark_completed(&entry.id, completed_at, message_id, response_body, attempt.duration_ms).await?;
                self.sync_status.complete(&key, retry_cap, true, completed_at, 1, 1).await?;
                self.circuit_breaker.record_authentication_success(entry.property_id);
                info!(property_id = entry.property_id, kind = %entry.kind, entity_id = %entry.entity_id, "dispatch completed");
                Ok(())
            }
            Err(error) => {
                let failed_at = Utc::now();
                let status = self.sync_status.fail(&key, retry_cap, true, failed_at, &error).await?;
                self.log_store
                    .mark_failed(
                        &entry.id,
                        failed_at,
                        attempt.message_id.as_deref(),
                        &error.message,
                        error.kind,
                        attempt.response_body.as_deref(),
                        attempt.duration_ms,
                        status.retry_count,
                        status.next_retry_at,
                    )
                    .await?;
                let error_log_entry = ErrorLogEntry::from_error(
                    Uuid::new_v4().to_string(),
                    attempt.message_id.clone(),
                    Some(format!("outbound dispatch: property {} kind {}", entry.property_id, entry.kind)),
                    &error,
                    failed_at,
                );
                if let Err(e) = self.error_log.insert(error_log_entry).await {
                    warn!(error = %e, job_id = %entry.id, "failed to write error log row");
                }
                if error.kind == ErrorKind::Authentication {
                    self.circuit_breaker.record_authentication_failure(entry.property_id);
                }
                warn!(property_id = entry.property_id, kind = %entry.kind, error = %error, "dispatch failed");
                Err(error)
            }
        }
    }

    async fn send_and_classify(&self, entry: &MessageLogEntry) -> (Attempt, Result<(), CoreError>) {
        let credentials = match self.credentials.credentials_for(entry.property_id).await {
            Ok(c) => c,
            Err(e) => return (Attempt { message_id: None, response_body: None, duration_ms: 0 }, Err(e)),
        };
        let now = Utc::now();
        let message_id = MessageId::generate(&self.message_id_prefix, now);
        let envelope = build_request(&message_id, &credentials, entry.action.as_deref(), &entry.body_xml, now);

        let timeout = entry.queue.spec().job_timeout;
        let started = Instant::now();
        let send_result = tokio::time::timeout(timeout, self.transport.send(entry.property_id, &entry.hotel_code, &envelope)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let raw = match send_result {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return (Attempt { message_id: Some(message_id.to_string()), response_body: None, duration_ms }, Err(e)),
            Err(_) => {
                let err = CoreError::classify(None, &format!("request timeout after {}s", timeout.as_secs()));
                return (Attempt { message_id: Some(message_id.to_string()), response_body: None, duration_ms }, Err(err));
            }
        };

        let parsed = parse_response(&raw, duration_ms);
        let attempt = Attempt { message_id: Some(message_id.to_string()), response_body: Some(raw), duration_ms };
        if parsed.success {
            (attempt, Ok(()))
        } else {
            let err = parsed.error.unwrap_or_else(|| CoreError::classify(None, "channel returned an unsuccessful response with no error detail"));
            (attempt, Err(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_log::SyncMode;
    use crate::queue::QueueKind;
    use htng_common::HotelCode;
    use htng_sync::{EntityType, EventBus};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex as TokioMutex;

    struct StubTransport {
        responses: TokioMutex<Vec<Result<String, CoreError>>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send(&self, _property_id: htng_common::PropertyId, _hotel_code: &HotelCode, _envelope_xml: &str) -> Result<String, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().await.pop().unwrap()
        }
    }

    struct StubCredentials;

    #[async_trait]
    impl CredentialSource for StubCredentials {
        async fn credentials_for(&self, _property_id: htng_common::PropertyId) -> Result<WsseCredentials, CoreError> {
            Ok(WsseCredentials { username: "svc".to_string(), password: "secret".to_string() })
        }
    }

    #[derive(Default)]
    struct InMemoryLogStore {
        rows: TokioMutex<HashMap<String, MessageLogEntry>>,
    }

    #[async_trait]
    impl crate::log_store::MessageLogStore for InMemoryLogStore {
        async fn enqueue(&self, entry: MessageLogEntry) -> Result<(), CoreError> {
            self.rows.lock().await.insert(entry.id.clone(), entry);
            Ok(())
        }
        async fn fetch_pending(&self, _queue: QueueKind, _limit: u32) -> Result<Vec<MessageLogEntry>, CoreError> {
            Ok(vec![])
        }
        async fn fetch_due_for_retry(&self, _queue: QueueKind, _now: chrono::DateTime<Utc>, _limit: u32) -> Result<Vec<MessageLogEntry>, CoreError> {
            Ok(vec![])
        }
        async fn fetch_stuck(&self, _queue: QueueKind, _timeout: std::time::Duration, _limit: u32) -> Result<Vec<MessageLogEntry>, CoreError> {
            Ok(vec![])
        }
        async fn mark_running(&self, id: &str, now: chrono::DateTime<Utc>) -> Result<(), CoreError> {
            if let Some(row) = self.rows.lock().await.get_mut(id) {
                row.opened_at = Some(now);
            }
            Ok(())
        }
        async fn mark_completed(&self, id: &str, now: chrono::DateTime<Utc>, message_id: &str, response_body: &str, duration_ms: u64) -> Result<(), CoreError> {
            if let Some(row) = self.rows.lock().await.get_mut(id) {
                row.closed_at = Some(now);
                row.status = crate::message_log::LogStatus::Completed;
                row.message_id = Some(message_id.to_string());
                row.response_body = Some(response_body.to_string());
                row.duration_ms = Some(duration_ms);
            }
            Ok(())
        }
        #[allow(clippy::too_many_arguments)]
        async fn mark_failed(
            &self,
            id: &str,
            now: chrono::DateTime<Utc>,
            message_id: Option<&str>,
            error_message: &str,
            error_kind: htng_errors::ErrorKind,
            response_body: Option<&str>,
            duration_ms: u64,
            retry_count: u32,
            next_retry_at: Option<chrono::DateTime<Utc>>,
        ) -> Result<(), CoreError> {
            if let Some(row) = self.rows.lock().await.get_mut(id) {
                row.closed_at = Some(now);
                row.status = crate::message_log::LogStatus::Failed;
                row.message_id = message_id.map(str::to_string);
                row.error_message = Some(error_message.to_string());
                row.error_kind = Some(error_kind);
                row.response_body = response_body.map(str::to_string);
                row.duration_ms = Some(duration_ms);
                row.retry_count = retry_count;
                row.next_retry_at = next_retry_at;
            }
            Ok(())
        }
        async fn reset_stuck(&self, _ids: &[String]) -> Result<(), CoreError> {
            Ok(())
        }
        async fn init_schema(&self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct InMemoryErrorLogStore {
        rows: TokioMutex<Vec<ErrorLogEntry>>,
    }

    #[async_trait]
    impl ErrorLogStore for InMemoryErrorLogStore {
        async fn insert(&self, entry: ErrorLogEntry) -> Result<(), CoreError> {
            self.rows.lock().await.push(entry);
            Ok(())
        }
        async fn fetch_unresolved(&self, _limit: u32) -> Result<Vec<ErrorLogEntry>, CoreError> {
            Ok(self.rows.lock().await.iter().filter(|e| e.resolved_at.is_none()).cloned().collect())
        }
        async fn resolve(&self, id: &str, now: chrono::DateTime<Utc>, resolved_by: &str) -> Result<(), CoreError> {
            if let Some(row) = self.rows.lock().await.iter_mut().find(|e| e.id == id) {
                row.resolved_at = Some(now);
                row.resolved_by = Some(resolved_by.to_string());
            }
            Ok(())
        }
        async fn init_schema(&self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn entry() -> MessageLogEntry {
        MessageLogEntry::new(
            "job-1".to_string(),
            1,
            HotelCode::parse("001234").unwrap(),
            htng_common::MessageKind::Rates,
            EntityType::RatePlan,
            "BAR".to_string(),
            QueueKind::Outbound,
            SyncMode::Delta,
            "<OTA_HotelRateNotifRQ/>".to_string(),
            None,
            Utc::now(),
        )
    }

    fn dispatcher_with(transport_responses: Vec<Result<String, CoreError>>) -> (Dispatcher, Arc<InMemoryLogStore>, Arc<SyncStatusService>, Arc<InMemoryErrorLogStore>) {
        let log_store = Arc::new(InMemoryLogStore::default());
        let error_log = Arc::new(InMemoryErrorLogStore::default());
        let sync_store: Arc<dyn htng_sync::SyncStatusStore> = Arc::new(FakeSyncStatusStore::default());
        let sync_status = Arc::new(SyncStatusService::new(sync_store, EventBus::new()));
        let dispatcher = Dispatcher {
            lease: Arc::new(LeaseRegistry::new()),
            log_store: log_store.clone(),
            error_log: error_log.clone(),
            sync_status: sync_status.clone(),
            circuit_breaker: Arc::new(PropertyCircuitBreakerRegistry::default()),
            transport: Arc::new(StubTransport { responses: TokioMutex::new(transport_responses), calls: AtomicU32::new(0) }),
            credentials: Arc::new(StubCredentials),
            message_id_prefix: "HTNG".to_string(),
        };
        (dispatcher, log_store, sync_status, error_log)
    }

    #[derive(Default)]
    struct FakeSyncStatusStore {
        rows: TokioMutex<HashMap<SyncStatusKey, htng_sync::SyncStatus>>,
    }

    #[async_trait]
    impl htng_sync::SyncStatusStore for FakeSyncStatusStore {
        async fn get_or_create(&self, key: &SyncStatusKey, retry_cap: u32, auto_retry: bool) -> Result<htng_sync::SyncStatus, CoreError> {
            let mut rows = self.rows.lock().await;
            Ok(rows.entry(key.clone()).or_insert_with(|| htng_sync::SyncStatus::new(key.clone(), retry_cap, auto_retry)).clone())
        }
        async fn save(&self, status: &htng_sync::SyncStatus) -> Result<(), CoreError> {
            self.rows.lock().await.insert(status.key.clone(), status.clone());
            Ok(())
        }
        async fn list_for_property(&self, property_id: htng_common::PropertyId) -> Result<Vec<htng_sync::SyncStatus>, CoreError> {
            Ok(self.rows.lock().await.values().filter(|s| s.key.property_id == property_id).cloned().collect())
        }
        async fn list_due_for_retry(&self, now: chrono::DateTime<Utc>) -> Result<Vec<htng_sync::SyncStatus>, CoreError> {
            Ok(self
                .rows
                .lock()
                .await
                .values()
                .filter(|s| s.state == htng_sync::SyncState::Failed && s.next_retry_at.map(|t| t <= now).unwrap_or(false))
                .cloned()
                .collect())
        }
        async fn init_schema(&self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn successful_dispatch_completes_log_and_status() {
        let ack = "<Envelope><Body><OTA_HotelRateNotifRS><Success/></OTA_HotelRateNotifRS></Body></Envelope>".to_string();
        let (dispatcher, log_store, sync_status, _error_log) = dispatcher_with(vec![Ok(ack)]);
        dispatcher.dispatch(&entry()).await.unwrap();

        let rows = log_store.rows.lock().await;
        assert_eq!(rows["job-1"].status, crate::message_log::LogStatus::Completed);
        assert!(rows["job-1"].message_id.is_some());
        assert!(rows["job-1"].duration_ms.is_some());
        drop(rows);

        let statuses = sync_status.list_for_property(1).await.unwrap();
        assert_eq!(statuses[0].state, htng_sync::SyncState::Completed);
    }

    #[tokio::test]
    async fn soap_fault_is_recorded_as_failure() {
        let fault = "<Envelope><Body><Fault><Code><Value>Client</Value></Code><Reason><Text>Authentication failed</Text></Reason></Fault></Body></Envelope>".to_string();
        let (dispatcher, log_store, _sync_status, error_log) = dispatcher_with(vec![Ok(fault)]);
        let result = dispatcher.dispatch(&entry()).await;
        assert!(result.is_err());

        let logged_errors = error_log.rows.lock().await;
        assert_eq!(logged_errors.len(), 1);
        assert_eq!(logged_errors[0].error_kind, htng_errors::ErrorKind::Authentication);
        assert_eq!(logged_errors[0].severity, htng_errors::Severity::Critical);
        drop(logged_errors);

        let rows = log_store.rows.lock().await;
        assert_eq!(rows["job-1"].status, crate::message_log::LogStatus::Failed);
    }
}
