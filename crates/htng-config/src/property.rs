//! Property mapping store (spec §3): the (property_id, hotel_code,
//! channel credentials, endpoint) rows that back both the outbound
//! scheduler's `CredentialSource` and the inbound dispatcher's
//! `CredentialVerifier`. Shape mirrors the message log/history stores —
//! a plain struct, an async trait, sqlite/postgres implementations.

use async_trait::async_trait;
use htng_common::{HotelCode, PropertyId};
use htng_envelope::WsseCredentials;
use htng_errors::CoreError;
use htng_inbound::CredentialVerifier;
use htng_scheduler::CredentialSource;
use sqlx::{PgPool, Row, SqlitePool};
use tracing::debug;

/// Strip a trailing `?wsdl` query to derive the live SOAP endpoint from
/// the configured WSDL location (spec §6).
pub fn derive_endpoint_url(wsdl_url: &str) -> String {
    wsdl_url.strip_suffix("?wsdl").unwrap_or(wsdl_url).to_string()
}

#[derive(Debug, Clone)]
pub struct PropertyMapping {
    pub property_id: PropertyId,
    pub hotel_code: HotelCode,
    pub channel_username: String,
    pub channel_password: String,
    pub wsdl_url: String,
    pub enabled: bool,
}

impl PropertyMapping {
    pub fn endpoint_url(&self) -> String {
        derive_endpoint_url(&self.wsdl_url)
    }
}

#[async_trait]
pub trait PropertyMappingStore: Send + Sync {
    async fn get(&self, property_id: PropertyId) -> Result<Option<PropertyMapping>, CoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<PropertyMapping>, CoreError>;

    async fn list(&self) -> Result<Vec<PropertyMapping>, CoreError>;

    async fn upsert(&self, mapping: PropertyMapping) -> Result<(), CoreError>;

    async fn init_schema(&self) -> Result<(), CoreError>;
}

/// Adapts `PropertyMappingStore` to the outbound scheduler's credential
/// seam: resolve a property's WSSE credentials by id.
pub struct OutboundCredentialAdapter {
    store: std::sync::Arc<dyn PropertyMappingStore>,
}

impl OutboundCredentialAdapter {
    pub fn new(store: std::sync::Arc<dyn PropertyMappingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CredentialSource for OutboundCredentialAdapter {
    async fn credentials_for(&self, property_id: PropertyId) -> Result<WsseCredentials, CoreError> {
        let mapping = self
            .store
            .get(property_id)
            .await?
            .ok_or_else(|| CoreError::classify(None, &format!("no property mapping for property {property_id}")))?;
        Ok(WsseCredentials { username: mapping.channel_username, password: mapping.channel_password })
    }
}

/// Adapts `PropertyMappingStore` to the inbound dispatcher's credential
/// seam: resolve the expected password and property for a WSSE username.
pub struct InboundCredentialAdapter {
    store: std::sync::Arc<dyn PropertyMappingStore>,
}

impl InboundCredentialAdapter {
    pub fn new(store: std::sync::Arc<dyn PropertyMappingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CredentialVerifier for InboundCredentialAdapter {
    async fn lookup(&self, username: &str) -> Result<(PropertyId, String), CoreError> {
        let mapping = self
            .store
            .find_by_username(username)
            .await?
            .ok_or_else(|| CoreError::classify(None, "unknown channel username"))?;
        if !mapping.enabled {
            return Err(CoreError::classify(None, "property mapping disabled"));
        }
        Ok((mapping.property_id, mapping.channel_password))
    }
}

pub struct SqlitePropertyMappingStore {
    pool: SqlitePool,
}

impl SqlitePropertyMappingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::sqlite::SqliteRow) -> Result<PropertyMapping, CoreError> {
        let hotel_code_raw: String = row.get("hotel_code");
        let hotel_code = HotelCode::parse(hotel_code_raw).map_err(|e| CoreError::classify(None, &e.to_string()))?;
        Ok(PropertyMapping {
            property_id: row.get("property_id"),
            hotel_code,
            channel_username: row.get("channel_username"),
            channel_password: row.get("channel_password"),
            wsdl_url: row.get("wsdl_url"),
            enabled: row.get::<i64, _>("enabled") != 0,
        })
    }
}

#[async_trait]
impl PropertyMappingStore for SqlitePropertyMappingStore {
    async fn get(&self, property_id: PropertyId) -> Result<Option<PropertyMapping>, CoreError> {
        let row = sqlx::query("SELECT * FROM property_mapping WHERE property_id = ?")
            .bind(property_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<PropertyMapping>, CoreError> {
        let row = sqlx::query("SELECT * FROM property_mapping WHERE channel_username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn list(&self) -> Result<Vec<PropertyMapping>, CoreError> {
        let rows = sqlx::query("SELECT * FROM property_mapping ORDER BY property_id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn upsert(&self, mapping: PropertyMapping) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO property_mapping (property_id, hotel_code, channel_username, channel_password, wsdl_url, enabled)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(property_id) DO UPDATE SET
                hotel_code = excluded.hotel_code,
                channel_username = excluded.channel_username,
                channel_password = excluded.channel_password,
                wsdl_url = excluded.wsdl_url,
                enabled = excluded.enabled
            "#,
        )
        .bind(mapping.property_id)
        .bind(mapping.hotel_code.as_str())
        .bind(&mapping.channel_username)
        .bind(&mapping.channel_password)
        .bind(&mapping.wsdl_url)
        .bind(mapping.enabled as i64)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS property_mapping (
                property_id INTEGER PRIMARY KEY,
                hotel_code TEXT NOT NULL,
                channel_username TEXT NOT NULL UNIQUE,
                channel_password TEXT NOT NULL,
                wsdl_url TEXT NOT NULL,
                enabled INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_property_mapping_username ON property_mapping(channel_username);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        debug!("property_mapping schema ready (sqlite)");
        Ok(())
    }
}

pub struct PostgresPropertyMappingStore {
    pool: PgPool,
}

impl PostgresPropertyMappingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> Result<PropertyMapping, CoreError> {
        let hotel_code_raw: String = row.get("hotel_code");
        let hotel_code = HotelCode::parse(hotel_code_raw).map_err(|e| CoreError::classify(None, &e.to_string()))?;
        Ok(PropertyMapping {
            property_id: row.get("property_id"),
            hotel_code,
            channel_username: row.get("channel_username"),
            channel_password: row.get("channel_password"),
            wsdl_url: row.get("wsdl_url"),
            enabled: row.get("enabled"),
        })
    }
}

#[async_trait]
impl PropertyMappingStore for PostgresPropertyMappingStore {
    async fn get(&self, property_id: PropertyId) -> Result<Option<PropertyMapping>, CoreError> {
        let row = sqlx::query("SELECT * FROM property_mapping WHERE property_id = $1")
            .bind(property_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<PropertyMapping>, CoreError> {
        let row = sqlx::query("SELECT * FROM property_mapping WHERE channel_username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn list(&self) -> Result<Vec<PropertyMapping>, CoreError> {
        let rows = sqlx::query("SELECT * FROM property_mapping ORDER BY property_id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn upsert(&self, mapping: PropertyMapping) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO property_mapping (property_id, hotel_code, channel_username, channel_password, wsdl_url, enabled)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT(property_id) DO UPDATE SET
                hotel_code = excluded.hotel_code,
                channel_username = excluded.channel_username,
                channel_password = excluded.channel_password,
                wsdl_url = excluded.wsdl_url,
                enabled = excluded.enabled
            "#,
        )
        .bind(mapping.property_id)
        .bind(mapping.hotel_code.as_str())
        .bind(&mapping.channel_username)
        .bind(&mapping.channel_password)
        .bind(&mapping.wsdl_url)
        .bind(mapping.enabled)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS property_mapping (
                property_id BIGINT PRIMARY KEY,
                hotel_code TEXT NOT NULL,
                channel_username TEXT NOT NULL UNIQUE,
                channel_password TEXT NOT NULL,
                wsdl_url TEXT NOT NULL,
                enabled BOOLEAN NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_property_mapping_username ON property_mapping(channel_username)")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        debug!("property_mapping schema ready (postgres)");
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> CoreError {
    CoreError::classify(None, &format!("property mapping store error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    fn mapping(property_id: PropertyId, username: &str) -> PropertyMapping {
        PropertyMapping {
            property_id,
            hotel_code: HotelCode::parse("001234").unwrap(),
            channel_username: username.to_string(),
            channel_password: "s3cr3t".to_string(),
            wsdl_url: "https://channel.example.com/htng2011b?wsdl".to_string(),
            enabled: true,
        }
    }

    async fn memory_store() -> SqlitePropertyMappingStore {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let store = SqlitePropertyMappingStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn upserts_and_finds_by_username() {
        let store = memory_store().await;
        store.upsert(mapping(7, "chan_user")).await.unwrap();

        let by_id = store.get(7).await.unwrap().unwrap();
        assert_eq!(by_id.channel_username, "chan_user");
        assert_eq!(by_id.endpoint_url(), "https://channel.example.com/htng2011b");

        let by_username = store.find_by_username("chan_user").await.unwrap().unwrap();
        assert_eq!(by_username.property_id, 7);

        assert!(store.find_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row_for_same_property() {
        let store = memory_store().await;
        store.upsert(mapping(1, "old_user")).await.unwrap();
        store.upsert(PropertyMapping { channel_username: "new_user".to_string(), ..mapping(1, "new_user") }).await.unwrap();

        assert!(store.find_by_username("old_user").await.unwrap().is_none());
        let current = store.get(1).await.unwrap().unwrap();
        assert_eq!(current.channel_username, "new_user");
    }

    #[tokio::test]
    async fn outbound_adapter_resolves_wsse_credentials() {
        let store = memory_store().await;
        store.upsert(mapping(3, "chan_user")).await.unwrap();
        let adapter = OutboundCredentialAdapter::new(std::sync::Arc::new(store));

        let creds = adapter.credentials_for(3).await.unwrap();
        assert_eq!(creds.username, "chan_user");
        assert_eq!(creds.password, "s3cr3t");
    }

    #[tokio::test]
    async fn inbound_adapter_rejects_disabled_mapping() {
        let store = memory_store().await;
        store.upsert(PropertyMapping { enabled: false, ..mapping(9, "disabled_user") }).await.unwrap();
        let adapter = InboundCredentialAdapter::new(std::sync::Arc::new(store));

        let err = adapter.lookup("disabled_user").await.unwrap_err();
        assert_eq!(err.kind, htng_errors::ErrorKind::Unknown);
    }
}
