//! SQLite-backed `MessageLogStore`. Same shape as `htng_sync::sqlite`:
//! millis-since-epoch timestamps, a `parse_row` helper, `?` placeholders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use htng_common::{Direction, HotelCode, MessageKind};
use htng_errors::{CoreError, ErrorKind};
use htng_sync::EntityType;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tracing::debug;

use crate::log_store::MessageLogStore;
use crate::message_log::{LogStatus, MessageLogEntry, SyncMode};
use crate::queue::QueueKind;

pub struct SqliteMessageLogStore {
    pool: SqlitePool,
}

impl SqliteMessageLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::sqlite::SqliteRow) -> Result<MessageLogEntry, CoreError> {
        let kind_raw: String = row.get("kind");
        let kind = MessageKind::parse(&kind_raw).ok_or_else(|| CoreError::classify(None, &format!("unknown kind in message log: {kind_raw}")))?;
        let entity_type_raw: String = row.get("entity_type");
        let entity_type = EntityType::parse(&entity_type_raw).ok_or_else(|| CoreError::classify(None, &format!("unknown entity type in message log: {entity_type_raw}")))?;
        let queue_raw: String = row.get("queue");
        let queue = QueueKind::parse(&queue_raw).ok_or_else(|| CoreError::classify(None, &format!("unknown queue in message log: {queue_raw}")))?;
        let status_raw: String = row.get("status");
        let status = LogStatus::parse(&status_raw).ok_or_else(|| CoreError::classify(None, &format!("unknown status in message log: {status_raw}")))?;
        let sync_mode_raw: String = row.get("sync_mode");
        let sync_mode = match sync_mode_raw.as_str() {
            "delta" => SyncMode::Delta,
            "full_sync" => SyncMode::FullSync,
            other => return Err(CoreError::classify(None, &format!("unknown sync mode in message log: {other}"))),
        };
        let hotel_code_raw: String = row.get("hotel_code");
        let hotel_code = HotelCode::parse(hotel_code_raw).map_err(|e| CoreError::classify(None, &e.to_string()))?;
        let direction_raw: String = row.get("direction");
        let direction = parse_direction(&direction_raw).ok_or_else(|| CoreError::classify(None, &format!("unknown direction in message log: {direction_raw}")))?;
        let error_kind = row
            .try_get::<Option<String>, _>("error_kind")
            .ok()
            .flatten()
            .map(|raw| parse_error_kind(&raw).ok_or_else(|| CoreError::classify(None, &format!("unknown error kind in message log: {raw}"))))
            .transpose()?;
        let metadata_raw: Option<String> = row.try_get("metadata").ok().flatten();
        let metadata = metadata_raw
            .map(|raw| serde_json::from_str(&raw).map_err(|e| CoreError::classify(None, &format!("corrupt metadata column: {e}"))))
            .transpose()?;

        Ok(MessageLogEntry {
            id: row.get("id"),
            message_id: row.try_get("message_id").ok().flatten(),
            direction,
            property_id: row.get("property_id"),
            hotel_code,
            kind,
            entity_type,
            entity_id: row.get("entity_id"),
            queue,
            sync_mode,
            body_xml: row.get("body_xml"),
            action: row.try_get("action").ok(),
            status,
            retry_count: row.get::<i64, _>("retry_count") as u32,
            error_message: row.try_get("error_message").ok().flatten(),
            error_kind,
            response_body: row.try_get("response_body").ok().flatten(),
            duration_ms: row.try_get::<Option<i64>, _>("duration_ms").ok().flatten().map(|v| v as u64),
            metadata,
            opened_at: row.try_get::<Option<i64>, _>("opened_at").ok().flatten().and_then(DateTime::from_timestamp_millis),
            closed_at: row.try_get::<Option<i64>, _>("closed_at").ok().flatten().and_then(DateTime::from_timestamp_millis),
            next_retry_at: row.try_get::<Option<i64>, _>("next_retry_at").ok().flatten().and_then(DateTime::from_timestamp_millis),
            created_at: DateTime::from_timestamp_millis(row.get::<i64, _>("created_at")).unwrap_or_else(Utc::now),
        })
    }

    fn sync_mode_str(mode: SyncMode) -> &'static str {
        match mode {
            SyncMode::Delta => "delta",
            SyncMode::FullSync => "full_sync",
        }
    }
}

fn direction_str(direction: Direction) -> &'static str {
    match direction {
        Direction::Outbound => "outbound",
        Direction::Inbound => "inbound",
    }
}

fn parse_direction(raw: &str) -> Option<Direction> {
    match raw {
        "outbound" => Some(Direction::Outbound),
        "inbound" => Some(Direction::Inbound),
        _ => None,
    }
}

fn parse_error_kind(raw: &str) -> Option<ErrorKind> {
    match raw {
        "authentication" => Some(ErrorKind::Authentication),
        "validation" => Some(ErrorKind::Validation),
        "business_logic" => Some(ErrorKind::BusinessLogic),
        "soap_xml" => Some(ErrorKind::SoapXml),
        "connection" => Some(ErrorKind::Connection),
        "timeout" => Some(ErrorKind::Timeout),
        "rate_limit" => Some(ErrorKind::RateLimit),
        "warning" => Some(ErrorKind::Warning),
        "unknown" => Some(ErrorKind::Unknown),
        _ => None,
    }
}

#[async_trait]
impl MessageLogStore for SqliteMessageLogStore {
    async fn enqueue(&self, entry: MessageLogEntry) -> Result<(), CoreError> {
        let metadata = entry.metadata.as_ref().map(serde_json::to_string).transpose().map_err(|e| CoreError::classify(None, &e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO message_log (
                id, message_id, direction, property_id, hotel_code, kind, entity_type, entity_id, queue, sync_mode,
                body_xml, action, status, retry_count, error_message, error_kind, response_body, duration_ms,
                metadata, opened_at, closed_at, next_retry_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.message_id)
        .bind(direction_str(entry.direction))
        .bind(entry.property_id)
        .bind(entry.hotel_code.as_str())
        .bind(entry.kind.as_str())
        .bind(entry.entity_type.as_str())
        .bind(&entry.entity_id)
        .bind(entry.queue.as_str())
        .bind(Self::sync_mode_str(entry.sync_mode))
        .bind(&entry.body_xml)
        .bind(&entry.action)
        .bind(entry.status.as_str())
        .bind(entry.retry_count as i64)
        .bind(&entry.error_message)
        .bind(entry.error_kind.map(|k| k.to_string()))
        .bind(&entry.response_body)
        .bind(entry.duration_ms.map(|v| v as i64))
        .bind(metadata)
        .bind(entry.opened_at.map(|t| t.timestamp_millis()))
        .bind(entry.closed_at.map(|t| t.timestamp_millis()))
        .bind(entry.next_retry_at.map(|t| t.timestamp_millis()))
        .bind(entry.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn fetch_pending(&self, queue: QueueKind, limit: u32) -> Result<Vec<MessageLogEntry>, CoreError> {
        let rows = sqlx::query("SELECT * FROM message_log WHERE queue = ? AND status = 'pending' ORDER BY created_at ASC LIMIT ?")
            .bind(queue.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn fetch_due_for_retry(&self, queue: QueueKind, now: DateTime<Utc>, limit: u32) -> Result<Vec<MessageLogEntry>, CoreError> {
        let rows = sqlx::query("SELECT * FROM message_log WHERE queue = ? AND status = 'failed' AND next_retry_at <= ? ORDER BY next_retry_at ASC LIMIT ?")
            .bind(queue.as_str())
            .bind(now.timestamp_millis())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn fetch_stuck(&self, queue: QueueKind, timeout: Duration, limit: u32) -> Result<Vec<MessageLogEntry>, CoreError> {
        let cutoff = (Utc::now() - chrono::Duration::from_std(timeout).unwrap_or_default()).timestamp_millis();
        let rows = sqlx::query("SELECT * FROM message_log WHERE queue = ? AND status = 'running' AND opened_at <= ? ORDER BY opened_at ASC LIMIT ?")
            .bind(queue.as_str())
            .bind(cutoff)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn mark_running(&self, id: &str, now: DateTime<Utc>) -> Result<(), CoreError> {
        sqlx::query("UPDATE message_log SET status = 'running', opened_at = ? WHERE id = ?")
            .bind(now.timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn mark_completed(&self, id: &str, now: DateTime<Utc>, message_id: &str, response_body: &str, duration_ms: u64) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE message_log SET status = 'completed', closed_at = ?, next_retry_at = NULL, message_id = ?, response_body = ?, duration_ms = ? WHERE id = ?",
        )
        .bind(now.timestamp_millis())
        .bind(message_id)
        .bind(response_body)
        .bind(duration_ms as i64)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &str,
        now: DateTime<Utc>,
        message_id: Option<&str>,
        error_message: &str,
        error_kind: ErrorKind,
        response_body: Option<&str>,
        duration_ms: u64,
        retry_count: u32,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE message_log SET
                status = 'failed', closed_at = ?, message_id = COALESCE(?, message_id), error_message = ?,
                error_kind = ?, response_body = ?, duration_ms = ?, retry_count = ?, next_retry_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(message_id)
        .bind(error_message)
        .bind(error_kind.to_string())
        .bind(response_body)
        .bind(duration_ms as i64)
        .bind(retry_count as i64)
        .bind(next_retry_at.map(|t| t.timestamp_millis()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn reset_stuck(&self, ids: &[String]) -> Result<(), CoreError> {
        for id in ids {
            sqlx::query("UPDATE message_log SET status = 'pending', opened_at = NULL WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS message_log (
                id TEXT PRIMARY KEY,
                message_id TEXT,
                direction TEXT NOT NULL DEFAULT 'outbound',
                property_id INTEGER NOT NULL,
                hotel_code TEXT NOT NULL,
                kind TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                queue TEXT NOT NULL,
                sync_mode TEXT NOT NULL,
                body_xml TEXT NOT NULL,
                action TEXT,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                error_kind TEXT,
                response_body TEXT,
                duration_ms INTEGER,
                metadata TEXT,
                opened_at INTEGER,
                closed_at INTEGER,
                next_retry_at INTEGER,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_message_log_queue_status ON message_log(queue, status);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_message_log_message_id ON message_log(message_id) WHERE message_id IS NOT NULL;
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        debug!("message_log schema ready (sqlite)");
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> CoreError {
    CoreError::classify(None, &format!("message log store error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use htng_sync::EntityType as Et;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteMessageLogStore {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let store = SqliteMessageLogStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    fn entry(id: &str) -> MessageLogEntry {
        MessageLogEntry::new(
            id.to_string(),
            1,
            HotelCode::parse("001234").unwrap(),
            MessageKind::Rates,
            Et::RatePlan,
            "BAR".to_string(),
            QueueKind::Outbound,
            SyncMode::Delta,
            "<OTA_HotelRateNotifRQ/>".to_string(),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn enqueue_then_fetch_pending() {
        let store = memory_store().await;
        store.enqueue(entry("job-1")).await.unwrap();
        let pending = store.fetch_pending(QueueKind::Outbound, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, LogStatus::Pending);
    }

    #[tokio::test]
    async fn running_then_failed_is_due_for_retry() {
        let store = memory_store().await;
        store.enqueue(entry("job-2")).await.unwrap();
        let now = Utc::now();
        store.mark_running("job-2", now).await.unwrap();
        store
            .mark_failed("job-2", now, Some("HTNG_20250601_120000_ABCD1234"), "request timeout", ErrorKind::Timeout, None, 150, 1, Some(now + chrono::Duration::seconds(60)))
            .await
            .unwrap();

        let not_yet = store.fetch_due_for_retry(QueueKind::Outbound, now, 10).await.unwrap();
        assert!(not_yet.is_empty());

        let due = store.fetch_due_for_retry(QueueKind::Outbound, now + chrono::Duration::seconds(120), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].retry_count, 1);
        assert_eq!(due[0].error_kind, Some(ErrorKind::Timeout));
        assert_eq!(due[0].message_id.as_deref(), Some("HTNG_20250601_120000_ABCD1234"));
        assert_eq!(due[0].duration_ms, Some(150));
    }

    #[tokio::test]
    async fn message_id_is_unique_once_assigned() {
        let store = memory_store().await;
        store.enqueue(entry("job-4")).await.unwrap();
        store.enqueue(entry("job-5")).await.unwrap();
        store.mark_completed("job-4", Utc::now(), "HTNG_20250601_120000_DUPLICAT", "<ok/>", 10).await.unwrap();
        let result = store.mark_completed("job-5", Utc::now(), "HTNG_20250601_120000_DUPLICAT", "<ok/>", 10).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stuck_running_rows_are_recoverable() {
        let store = memory_store().await;
        store.enqueue(entry("job-3")).await.unwrap();
        let opened = Utc::now() - chrono::Duration::minutes(10);
        store.mark_running("job-3", opened).await.unwrap();

        let stuck = store.fetch_stuck(QueueKind::Outbound, Duration::from_secs(120), 10).await.unwrap();
        assert_eq!(stuck.len(), 1);

        store.reset_stuck(&["job-3".to_string()]).await.unwrap();
        let pending = store.fetch_pending(QueueKind::Outbound, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }
}
