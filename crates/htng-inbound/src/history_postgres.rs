//! PostgreSQL-backed `MessageHistoryStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use htng_common::{HotelCode, MessageKind, Truncated};
use htng_errors::CoreError;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::history::{HistoryStatus, MessageHistoryEntry, MessageHistoryStore};

pub struct PostgresMessageHistoryStore {
    pool: PgPool,
}

impl PostgresMessageHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> Result<MessageHistoryEntry, CoreError> {
        let kind_raw: String = row.get("kind");
        let kind = MessageKind::parse(&kind_raw).ok_or_else(|| CoreError::classify(None, &format!("unknown kind in message history: {kind_raw}")))?;
        let status_raw: String = row.get("status");
        let status = HistoryStatus::parse(&status_raw).ok_or_else(|| CoreError::classify(None, &format!("unknown status in message history: {status_raw}")))?;
        let hotel_code_raw: String = row.get("hotel_code");
        let hotel_code = HotelCode::parse(hotel_code_raw).map_err(|e| CoreError::classify(None, &e.to_string()))?;
        let stored: String = row.get("raw_xml");
        let original_len: i64 = row.get("raw_xml_original_len");
        let truncated: bool = row.get("raw_xml_truncated");

        Ok(MessageHistoryEntry {
            id: row.get("id"),
            property_id: row.get("property_id"),
            hotel_code,
            kind,
            fingerprint: row.get("fingerprint"),
            raw_xml: Truncated { stored, original_len: original_len as usize, truncated },
            status,
            ack_xml: row.try_get("ack_xml").ok().flatten(),
            error_message: row.try_get("error_message").ok().flatten(),
            created_at: DateTime::from_timestamp_millis(row.get::<i64, _>("created_at")).unwrap_or_else(Utc::now),
            closed_at: row.try_get::<Option<i64>, _>("closed_at").ok().flatten().and_then(DateTime::from_timestamp_millis),
        })
    }
}

#[async_trait]
impl MessageHistoryStore for PostgresMessageHistoryStore {
    async fn insert_pending(&self, entry: MessageHistoryEntry) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO message_history (
                id, property_id, hotel_code, kind, fingerprint, raw_xml, raw_xml_original_len,
                raw_xml_truncated, status, ack_xml, error_message, created_at, closed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.property_id)
        .bind(entry.hotel_code.as_str())
        .bind(entry.kind.as_str())
        .bind(&entry.fingerprint)
        .bind(&entry.raw_xml.stored)
        .bind(entry.raw_xml.original_len as i64)
        .bind(entry.raw_xml.truncated)
        .bind(entry.status.as_str())
        .bind(&entry.ack_xml)
        .bind(&entry.error_message)
        .bind(entry.created_at.timestamp_millis())
        .bind(entry.closed_at.map(|t| t.timestamp_millis()))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_by_fingerprint(&self, hotel_code: &HotelCode, kind: MessageKind, fingerprint: &str) -> Result<Option<MessageHistoryEntry>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM message_history WHERE hotel_code = $1 AND kind = $2 AND fingerprint = $3 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(hotel_code.as_str())
        .bind(kind.as_str())
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn mark_completed(&self, id: &str, now: DateTime<Utc>, ack_xml: &str) -> Result<(), CoreError> {
        sqlx::query("UPDATE message_history SET status = 'completed', ack_xml = $1, closed_at = $2 WHERE id = $3")
            .bind(ack_xml)
            .bind(now.timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, now: DateTime<Utc>, error_message: &str, ack_xml: Option<&str>) -> Result<(), CoreError> {
        sqlx::query("UPDATE message_history SET status = 'failed', error_message = $1, ack_xml = $2, closed_at = $3 WHERE id = $4")
            .bind(error_message)
            .bind(ack_xml)
            .bind(now.timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS message_history (
                id TEXT PRIMARY KEY,
                property_id BIGINT NOT NULL,
                hotel_code TEXT NOT NULL,
                kind TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                raw_xml TEXT NOT NULL,
                raw_xml_original_len BIGINT NOT NULL,
                raw_xml_truncated BOOLEAN NOT NULL,
                status TEXT NOT NULL,
                ack_xml TEXT,
                error_message TEXT,
                created_at BIGINT NOT NULL,
                closed_at BIGINT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_message_history_dedup ON message_history(hotel_code, kind, fingerprint)")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        debug!("message_history schema ready (postgres)");
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> CoreError {
    CoreError::classify(None, &format!("message history store error: {e}"))
}
