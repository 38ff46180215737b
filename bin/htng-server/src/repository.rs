//! A reference `PmsRepository` backed by SQLite, wired up so the server
//! is runnable standalone. A production deployment supplies its own
//! implementation against the real PMS; this stands in for it the same
//! way the teacher's scheduler server wires a logging `DevQueuePublisher`
//! in place of a real queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use htng_common::PropertyId;
use htng_errors::CoreError;
use htng_repository::{
    ChangeStream, ChangedInventory, ChangedRate, ChangedRestriction, InboundUpdate, PmsRepository, ReservationOperation,
};
use sqlx::SqlitePool;
use tracing::info;

pub struct SqlitePmsRepository {
    pool: SqlitePool,
}

impl SqlitePmsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dev_properties (property_id INTEGER PRIMARY KEY);
            CREATE TABLE IF NOT EXISTS dev_room_types (property_id INTEGER NOT NULL, code TEXT NOT NULL, PRIMARY KEY (property_id, code));
            CREATE TABLE IF NOT EXISTS dev_rate_plans (property_id INTEGER NOT NULL, code TEXT NOT NULL, PRIMARY KEY (property_id, code));
            CREATE TABLE IF NOT EXISTS dev_applied_events (id INTEGER PRIMARY KEY AUTOINCREMENT, kind TEXT NOT NULL, payload TEXT NOT NULL, applied_at INTEGER NOT NULL);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl PmsRepository for SqlitePmsRepository {
    async fn property_exists(&self, property_id: PropertyId) -> Result<bool, CoreError> {
        let row = sqlx::query("SELECT 1 FROM dev_properties WHERE property_id = ?")
            .bind(property_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.is_some())
    }

    async fn room_type_exists_for_property(&self, property_id: PropertyId, code: &str) -> Result<bool, CoreError> {
        let row = sqlx::query("SELECT 1 FROM dev_room_types WHERE property_id = ? AND code = ?")
            .bind(property_id)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.is_some())
    }

    async fn rate_plan_exists_for_property(&self, property_id: PropertyId, code: &str) -> Result<bool, CoreError> {
        let row = sqlx::query("SELECT 1 FROM dev_rate_plans WHERE property_id = ? AND code = ?")
            .bind(property_id)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.is_some())
    }

    async fn apply_inbound_reservation(&self, operation: ReservationOperation) -> Result<(), CoreError> {
        let (kind, payload) = match &operation {
            ReservationOperation::Create(r) => ("reservation_create", format!("{r:?}")),
            ReservationOperation::Modify(r) => ("reservation_modify", format!("{r:?}")),
            ReservationOperation::Cancel { property_id, confirmation_id } => {
                ("reservation_cancel", format!("property_id={property_id} confirmation_id={confirmation_id}"))
            }
        };
        self.record_event(kind, &payload).await?;
        info!(kind, "applied inbound reservation operation (dev repository)");
        Ok(())
    }

    async fn apply_inbound_update(&self, update: InboundUpdate) -> Result<(), CoreError> {
        let (kind, payload) = match &update {
            InboundUpdate::Inventory { property_id, message } => ("inventory_update", format!("property_id={property_id} hotel_code={}", message.hotel_code)),
            InboundUpdate::Rate { property_id, message } => ("rate_update", format!("property_id={property_id} hotel_code={}", message.hotel_code)),
            InboundUpdate::Restriction { property_id, message } => ("restriction_update", format!("property_id={property_id} hotel_code={}", message.hotel_code)),
            InboundUpdate::GroupBlock { property_id, block } => ("group_block_update", format!("property_id={property_id} block_code={}", block.block_code)),
        };
        self.record_event(kind, &payload).await?;
        info!(kind, "applied inbound update (dev repository)");
        Ok(())
    }

    async fn iterate_changed_inventory(&self, _property_id: PropertyId, _since: Option<DateTime<Utc>>) -> Result<ChangeStream<'static, ChangedInventory>, CoreError> {
        Ok(Box::pin(stream::empty()))
    }

    async fn iterate_changed_rates(&self, _property_id: PropertyId, _since: Option<DateTime<Utc>>) -> Result<ChangeStream<'static, ChangedRate>, CoreError> {
        Ok(Box::pin(stream::empty()))
    }

    async fn iterate_changed_restrictions(&self, _property_id: PropertyId, _since: Option<DateTime<Utc>>) -> Result<ChangeStream<'static, ChangedRestriction>, CoreError> {
        Ok(Box::pin(stream::empty()))
    }
}

impl SqlitePmsRepository {
    async fn record_event(&self, kind: &str, payload: &str) -> Result<(), CoreError> {
        sqlx::query("INSERT INTO dev_applied_events (kind, payload, applied_at) VALUES (?, ?, ?)")
            .bind(kind)
            .bind(payload)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> CoreError {
    CoreError::classify(None, &format!("dev repository error: {e}"))
}
