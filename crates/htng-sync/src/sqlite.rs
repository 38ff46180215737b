//! SQLite-backed `SyncStatusStore`.
//!
//! Timestamps are stored as unix milliseconds, `change_log` as a JSON
//! array, to keep the schema close to what `fc-outbox`'s sqlite store
//! does for its own audit columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use htng_common::{MessageKind, PropertyId};
use htng_errors::CoreError;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::status::{EntityType, SyncState, SyncStatus, SyncStatusKey};
use crate::store::SyncStatusStore;

pub struct SqliteSyncStatusStore {
    pool: SqlitePool,
}

impl SqliteSyncStatusStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn parse_row(row: &sqlx::sqlite::SqliteRow) -> Result<SyncStatus, CoreError> {
        let kind_raw: String = row.get("kind");
        let kind = MessageKind::parse(&kind_raw)
            .ok_or_else(|| CoreError::classify(None, &format!("unknown sync status kind in storage: {kind_raw}")))?;
        let entity_type_raw: String = row.get("entity_type");
        let entity_type = EntityType::parse(&entity_type_raw)
            .ok_or_else(|| CoreError::classify(None, &format!("unknown entity type in storage: {entity_type_raw}")))?;
        let state_raw: String = row.get("state");
        let state = SyncState::parse(&state_raw)
            .ok_or_else(|| CoreError::classify(None, &format!("unknown sync state in storage: {state_raw}")))?;

        let change_log_raw: String = row.get("change_log");
        let change_log: Vec<String> = serde_json::from_str(&change_log_raw)
            .map_err(|e| CoreError::classify(None, &format!("corrupt change_log column: {e}")))?;

        Ok(SyncStatus {
            key: SyncStatusKey {
                property_id: row.get("property_id"),
                kind,
                entity_type,
                entity_id: row.get("entity_id"),
            },
            state,
            last_attempt: row.try_get::<Option<i64>, _>("last_attempt").ok().flatten().and_then(DateTime::from_timestamp_millis),
            last_success: row.try_get::<Option<i64>, _>("last_success").ok().flatten().and_then(DateTime::from_timestamp_millis),
            attempt_count: row.get::<i64, _>("attempt_count") as u32,
            retry_count: row.get::<i64, _>("retry_count") as u32,
            retry_cap: row.get::<i64, _>("retry_cap") as u32,
            next_retry_at: row.try_get::<Option<i64>, _>("next_retry_at").ok().flatten().and_then(DateTime::from_timestamp_millis),
            last_error: row.try_get("last_error").ok().flatten(),
            records_processed: row.get::<i64, _>("records_processed") as u64,
            records_total: row.get::<i64, _>("records_total") as u64,
            success_rate: row.get("success_rate"),
            auto_retry: row.get::<i64, _>("auto_retry") != 0,
            change_log,
        })
    }
}

#[async_trait]
impl SyncStatusStore for SqliteSyncStatusStore {
    async fn get_or_create(&self, key: &SyncStatusKey, retry_cap: u32, auto_retry: bool) -> Result<SyncStatus, CoreError> {
        let existing = sqlx::query(
            "SELECT * FROM sync_status WHERE property_id = ? AND kind = ? AND entity_type = ? AND entity_id = ?",
        )
        .bind(key.property_id)
        .bind(key.kind.as_str())
        .bind(key.entity_type.as_str())
        .bind(&key.entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        if let Some(row) = existing {
            return Self::parse_row(&row);
        }

        let fresh = SyncStatus::new(key.clone(), retry_cap, auto_retry);
        self.save(&fresh).await?;
        Ok(fresh)
    }

    async fn save(&self, status: &SyncStatus) -> Result<(), CoreError> {
        let change_log = serde_json::to_string(&status.change_log).map_err(|e| CoreError::classify(None, &e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO sync_status (
                property_id, kind, entity_type, entity_id, state,
                last_attempt, last_success, attempt_count, retry_count, retry_cap,
                next_retry_at, last_error, records_processed, records_total, success_rate,
                auto_retry, change_log
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (property_id, kind, entity_type, entity_id) DO UPDATE SET
                state = excluded.state,
                last_attempt = excluded.last_attempt,
                last_success = excluded.last_success,
                attempt_count = excluded.attempt_count,
                retry_count = excluded.retry_count,
                retry_cap = excluded.retry_cap,
                next_retry_at = excluded.next_retry_at,
                last_error = excluded.last_error,
                records_processed = excluded.records_processed,
                records_total = excluded.records_total,
                success_rate = excluded.success_rate,
                auto_retry = excluded.auto_retry,
                change_log = excluded.change_log
            "#,
        )
        .bind(status.key.property_id)
        .bind(status.key.kind.as_str())
        .bind(status.key.entity_type.as_str())
        .bind(&status.key.entity_id)
        .bind(status.state.as_str())
        .bind(status.last_attempt.map(|t| t.timestamp_millis()))
        .bind(status.last_success.map(|t| t.timestamp_millis()))
        .bind(status.attempt_count as i64)
        .bind(status.retry_count as i64)
        .bind(status.retry_cap as i64)
        .bind(status.next_retry_at.map(|t| t.timestamp_millis()))
        .bind(&status.last_error)
        .bind(status.records_processed as i64)
        .bind(status.records_total as i64)
        .bind(status.success_rate)
        .bind(status.auto_retry as i64)
        .bind(change_log)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn list_for_property(&self, property_id: PropertyId) -> Result<Vec<SyncStatus>, CoreError> {
        let rows = sqlx::query("SELECT * FROM sync_status WHERE property_id = ?")
            .bind(property_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn list_due_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<SyncStatus>, CoreError> {
        let rows = sqlx::query("SELECT * FROM sync_status WHERE state = 'failed' AND next_retry_at <= ?")
            .bind(now.timestamp_millis())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn init_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_status (
                property_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                state TEXT NOT NULL,
                last_attempt INTEGER,
                last_success INTEGER,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                retry_count INTEGER NOT NULL DEFAULT 0,
                retry_cap INTEGER NOT NULL DEFAULT 0,
                next_retry_at INTEGER,
                last_error TEXT,
                records_processed INTEGER NOT NULL DEFAULT 0,
                records_total INTEGER NOT NULL DEFAULT 0,
                success_rate REAL NOT NULL DEFAULT 0,
                auto_retry INTEGER NOT NULL DEFAULT 1,
                change_log TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (property_id, kind, entity_type, entity_id)
            );
            CREATE INDEX IF NOT EXISTS idx_sync_status_retry ON sync_status(state, next_retry_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        debug!("sync_status schema ready (sqlite)");
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> CoreError {
    CoreError::classify(None, &format!("sync status store error: {e}"))
}
