//! SQLite-backed `InboundWorkStore`.

use async_trait::async_trait;
use chrono::Utc;
use htng_common::{HotelCode, MessageKind, Truncated};
use htng_errors::CoreError;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::history::MAX_STORED_BODY_BYTES;
use crate::work::{InboundWorkItem, InboundWorkStore, ReservationStatusWire, WorkStatus};

pub struct SqliteInboundWorkStore {
    pool: SqlitePool,
}

impl SqliteInboundWorkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::sqlite::SqliteRow) -> Result<InboundWorkItem, CoreError> {
        let kind_raw: String = row.get("kind");
        let kind = MessageKind::parse(&kind_raw).ok_or_else(|| CoreError::classify(None, &format!("unknown kind in inbound work item: {kind_raw}")))?;
        let status_raw: String = row.get("status");
        let status = WorkStatus::parse(&status_raw).ok_or_else(|| CoreError::classify(None, &format!("unknown status in inbound work item: {status_raw}")))?;
        let hotel_code_raw: String = row.get("hotel_code");
        let hotel_code = HotelCode::parse(hotel_code_raw).map_err(|e| CoreError::classify(None, &e.to_string()))?;
        let reservation_status: Option<String> = row.try_get("reservation_status").ok().flatten();
        let reservation_status = reservation_status.and_then(|s| ReservationStatusWire::parse(&s));

        Ok(InboundWorkItem {
            id: row.get("id"),
            property_id: row.get("property_id"),
            hotel_code,
            kind,
            reservation_status,
            body_xml: row.get("body_xml"),
            history_id: row.get("history_id"),
            status,
            retry_count: row.get::<i64, _>("retry_count") as u32,
            error_message: row.try_get("error_message").ok().flatten(),
            created_at: chrono::DateTime::from_timestamp_millis(row.get::<i64, _>("created_at")).unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl InboundWorkStore for SqliteInboundWorkStore {
    async fn enqueue(&self, item: InboundWorkItem) -> Result<(), CoreError> {
        let capped = Truncated::cap(&item.body_xml, MAX_STORED_BODY_BYTES);
        sqlx::query(
            r#"
            INSERT INTO inbound_work (
                id, property_id, hotel_code, kind, reservation_status, body_xml,
                history_id, status, retry_count, error_message, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(item.property_id)
        .bind(item.hotel_code.as_str())
        .bind(item.kind.as_str())
        .bind(item.reservation_status.map(|s| s.as_str()))
        .bind(&capped.stored)
        .bind(&item.history_id)
        .bind(item.status.as_str())
        .bind(item.retry_count as i64)
        .bind(&item.error_message)
        .bind(item.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn fetch_pending(&self, limit: u32) -> Result<Vec<InboundWorkItem>, CoreError> {
        let rows = sqlx::query("SELECT * FROM inbound_work WHERE status = 'pending' ORDER BY created_at ASC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn mark_running(&self, id: &str) -> Result<(), CoreError> {
        sqlx::query("UPDATE inbound_work SET status = 'running' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn mark_completed(&self, id: &str) -> Result<(), CoreError> {
        sqlx::query("UPDATE inbound_work SET status = 'completed' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error_message: &str) -> Result<(), CoreError> {
        sqlx::query("UPDATE inbound_work SET status = 'failed', error_message = ?, retry_count = retry_count + 1 WHERE id = ?")
            .bind(error_message)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inbound_work (
                id TEXT PRIMARY KEY,
                property_id INTEGER NOT NULL,
                hotel_code TEXT NOT NULL,
                kind TEXT NOT NULL,
                reservation_status TEXT,
                body_xml TEXT NOT NULL,
                history_id TEXT NOT NULL,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                error_message TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_inbound_work_pending ON inbound_work(status, created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        debug!("inbound_work schema ready (sqlite)");
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> CoreError {
    CoreError::classify(None, &format!("inbound work store error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteInboundWorkStore {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let store = SqliteInboundWorkStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    fn item(id: &str) -> InboundWorkItem {
        InboundWorkItem::new(
            id.to_string(),
            1,
            HotelCode::parse("001234").unwrap(),
            MessageKind::Reservation,
            Some(ReservationStatusWire::Cancelled),
            "<OTA_HotelResNotifRQ/>".to_string(),
            "history-1".to_string(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn enqueues_and_fetches_pending_in_order() {
        let store = memory_store().await;
        store.enqueue(item("w-1")).await.unwrap();
        store.enqueue(item("w-2")).await.unwrap();

        let pending = store.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, "w-1");
        assert_eq!(pending[0].reservation_status, Some(ReservationStatusWire::Cancelled));
    }

    #[tokio::test]
    async fn completed_items_drop_out_of_pending() {
        let store = memory_store().await;
        store.enqueue(item("w-3")).await.unwrap();
        store.mark_running("w-3").await.unwrap();
        store.mark_completed("w-3").await.unwrap();

        let pending = store.fetch_pending(10).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn failed_items_record_error_and_bump_retry_count() {
        let store = memory_store().await;
        store.enqueue(item("w-4")).await.unwrap();
        store.mark_failed("w-4", "repository unavailable").await.unwrap();

        let rows = sqlx::query("SELECT retry_count, error_message FROM inbound_work WHERE id = 'w-4'")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        let retry_count: i64 = rows.get("retry_count");
        let error_message: Option<String> = rows.get("error_message");
        assert_eq!(retry_count, 1);
        assert_eq!(error_message.as_deref(), Some("repository unavailable"));
    }
}
