//! HTNG 2011B channel integration server: hosts the inbound SOAP
//! endpoint (C7) and runs the outbound dispatch scheduler (C6)
//! alongside it, as one process. Grounded on the teacher's
//! `fc-scheduler-server`: load config, wire the scheduler, serve axum
//! with graceful shutdown.

mod repository;
mod transport;

use std::str::FromStr;
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use htng_config::{ConfigLoader, InboundCredentialAdapter, OutboundCredentialAdapter, PropertyMappingStore, SqlitePropertyMappingStore};
use htng_inbound::{
    InboundDispatcher, InboundProcessor, InboundProcessorConfig, InboundWorkStore, MessageHistoryStore, SqliteInboundWorkStore,
    SqliteMessageHistoryStore,
};
use htng_scheduler::circuit_breaker::{CircuitBreakerConfig, PropertyCircuitBreakerRegistry};
use htng_scheduler::{Dispatcher, ErrorLogStore, LeaseRegistry, MessageLogStore, Scheduler, SchedulerConfig, SqliteErrorLogStore, SqliteMessageLogStore};
use htng_sync::{EventBus, SqliteSyncStatusStore, SyncStatusService, SyncStatusStore};
use htng_validation::{ValidationPipeline, WellFormednessSchemaSource};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use repository::SqlitePmsRepository;
use transport::ReqwestTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    htng_common::logging::init_logging("htng-server");

    let config = ConfigLoader::new().load()?;
    info!(port = config.http.port, database_url = %config.database.url, "htng-server starting");

    let pool = connect_sqlite(&config.database.url).await?;

    let property_mappings: Arc<dyn PropertyMappingStore> = Arc::new(SqlitePropertyMappingStore::new(pool.clone()));
    property_mappings.init_schema().await?;

    let repository = Arc::new(SqlitePmsRepository::new(pool.clone()));
    repository.init_schema().await?;

    let log_store = Arc::new(SqliteMessageLogStore::new(pool.clone()));
    log_store.init_schema().await?;

    let sync_store = Arc::new(SqliteSyncStatusStore::new(pool.clone()));
    sync_store.init_schema().await?;
    let sync_status = Arc::new(SyncStatusService::new(sync_store, EventBus::new()));

    let history_store = Arc::new(SqliteMessageHistoryStore::new(pool.clone()));
    history_store.init_schema().await?;

    let work_store = Arc::new(SqliteInboundWorkStore::new(pool.clone()));
    work_store.init_schema().await?;

    let error_log: Arc<dyn ErrorLogStore> = Arc::new(SqliteErrorLogStore::new(pool.clone()));
    error_log.init_schema().await?;

    let lease = Arc::new(LeaseRegistry::new());
    let circuit_breaker = Arc::new(PropertyCircuitBreakerRegistry::new(CircuitBreakerConfig::default()));

    let http_client = reqwest::Client::new();
    let transport = Arc::new(ReqwestTransport::new(http_client, property_mappings.clone()));
    let outbound_credentials = Arc::new(OutboundCredentialAdapter::new(property_mappings.clone()));

    let dispatcher = Arc::new(Dispatcher {
        lease: lease.clone(),
        log_store: log_store.clone(),
        sync_status: sync_status.clone(),
        circuit_breaker,
        transport,
        credentials: outbound_credentials,
        message_id_prefix: "HTNG".to_string(),
        error_log: error_log.clone(),
    });

    let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default(), dispatcher, log_store));
    scheduler.start().await;

    let inbound_credentials = Arc::new(InboundCredentialAdapter::new(property_mappings));
    let validation = Arc::new(ValidationPipeline::new(Arc::new(WellFormednessSchemaSource), repository.clone()));

    let inbound_dispatcher = Arc::new(InboundDispatcher {
        credentials: inbound_credentials,
        history: history_store,
        work: work_store.clone(),
        validation,
        leases: lease.clone(),
        error_log,
    });

    let inbound_processor = Arc::new(InboundProcessor::new(InboundProcessorConfig::default(), work_store, repository, lease));
    inbound_processor.start().await;

    let app = Router::new()
        .merge(htng_inbound::router(inbound_dispatcher))
        .route("/healthz", get(healthz))
        .route("/readyz", get(move || readyz(scheduler.clone())));

    let addr = format!("{}:{}", config.http.host, config.http.port);
    info!(%addr, "HTTP server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("htng-server stopped");
    Ok(())
}

async fn connect_sqlite(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    Ok(SqlitePoolOptions::new().max_connections(10).connect_with(options).await?)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "UP" }))
}

async fn readyz(scheduler: Arc<Scheduler>) -> Json<serde_json::Value> {
    let running = scheduler.is_running().await;
    Json(serde_json::json!({ "status": if running { "UP" } else { "DOWN" }, "scheduler_running": running }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
