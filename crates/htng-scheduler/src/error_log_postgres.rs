//! PostgreSQL-backed `ErrorLogStore`. `$n` placeholders, explicit
//! `ON CONFLICT`-free inserts (ids are client-generated and unique).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use htng_errors::{CoreError, ErrorKind, Severity};
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::error_log::ErrorLogEntry;
use crate::error_log_store::ErrorLogStore;

pub struct PostgresErrorLogStore {
    pool: PgPool,
}

impl PostgresErrorLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> Result<ErrorLogEntry, CoreError> {
        let error_code: Option<String> = row.try_get("error_code").ok().flatten();
        let message: String = row.get("message");
        let kind_raw: String = row.get("error_kind");
        let error_kind = parse_kind(&kind_raw).ok_or_else(|| CoreError::classify(None, &format!("unknown error kind in error log: {kind_raw}")))?;
        let severity_raw: String = row.get("severity");
        let severity = parse_severity(&severity_raw)
            .ok_or_else(|| CoreError::classify(None, &format!("unknown severity in error log: {severity_raw}")))?;

        Ok(ErrorLogEntry {
            id: row.get("id"),
            message_id: row.try_get("message_id").ok().flatten(),
            error_kind,
            error_code,
            severity,
            message,
            stack: row.try_get("stack").ok().flatten(),
            source_context: row.try_get("source_context").ok().flatten(),
            can_retry: row.get("can_retry"),
            retry_delay_seconds: row.try_get::<Option<i64>, _>("retry_delay_seconds").ok().flatten().map(|v| v as u32),
            manual_intervention: row.get("manual_intervention"),
            resolved_at: row.try_get::<Option<i64>, _>("resolved_at").ok().flatten().and_then(DateTime::from_timestamp_millis),
            resolved_by: row.try_get("resolved_by").ok().flatten(),
            created_at: DateTime::from_timestamp_millis(row.get::<i64, _>("created_at")).unwrap_or_else(Utc::now),
        })
    }
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::High => "high",
        Severity::Medium => "medium",
        Severity::Low => "low",
    }
}

fn parse_severity(raw: &str) -> Option<Severity> {
    match raw {
        "critical" => Some(Severity::Critical),
        "high" => Some(Severity::High),
        "medium" => Some(Severity::Medium),
        "low" => Some(Severity::Low),
        _ => None,
    }
}

fn parse_kind(raw: &str) -> Option<ErrorKind> {
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
impl ErrorLogStore for PostgresErrorLogStore {
    async fn insert(&self, entry: ErrorLogEntry) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO error_log (
                id, message_id, error_kind, error_code, severity, message, stack, source_context,
                can_retry, retry_delay_seconds, manual_intervention, resolved_at, resolved_by, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.message_id)
        .bind(entry.error_kind.to_string())
        .bind(&entry.error_code)
        .bind(severity_str(entry.severity))
        .bind(&entry.message)
        .bind(&entry.stack)
        .bind(&entry.source_context)
        .bind(entry.can_retry)
        .bind(entry.retry_delay_seconds.map(|v| v as i64))
        .bind(entry.manual_intervention)
        .bind(entry.resolved_at.map(|t| t.timestamp_millis()))
        .bind(&entry.resolved_by)
        .bind(entry.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn fetch_unresolved(&self, limit: u32) -> Result<Vec<ErrorLogEntry>, CoreError> {
        let rows = sqlx::query("SELECT * FROM error_log WHERE resolved_at IS NULL ORDER BY created_at ASC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn resolve(&self, id: &str, now: DateTime<Utc>, resolved_by: &str) -> Result<(), CoreError> {
        sqlx::query("UPDATE error_log SET resolved_at = $1, resolved_by = $2 WHERE id = $3")
            .bind(now.timestamp_millis())
            .bind(resolved_by)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS error_log (
                id TEXT PRIMARY KEY,
                message_id TEXT,
                error_kind TEXT NOT NULL,
                error_code TEXT,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                stack TEXT,
                source_context TEXT,
                can_retry BOOLEAN NOT NULL,
                retry_delay_seconds BIGINT,
                manual_intervention BOOLEAN NOT NULL,
                resolved_at BIGINT,
                resolved_by TEXT,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_error_log_unresolved ON error_log(resolved_at)")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_error_log_message_id ON error_log(message_id)")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        debug!("error_log schema ready (postgres)");
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> CoreError {
    CoreError::classify(None, &format!("error log store error: {e}"))
}
