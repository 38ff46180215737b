//! Inbound dispatcher (spec §4.7, component C7): authenticates, classifies,
//! deduplicates, persists, enqueues, and acknowledges HTNG 2011B messages
//! submitted by a channel/CRS.

pub mod credentials;
pub mod dispatch;
pub mod history;
pub mod history_postgres;
pub mod history_sqlite;
pub mod http;
pub mod process;
pub mod work;
pub mod work_postgres;
pub mod work_sqlite;

pub use credentials::{authenticate, CredentialVerifier};
pub use dispatch::{apply_work_item, DispatchOutcome, InboundDispatcher};
pub use history::{HistoryStatus, MessageHistoryEntry, MessageHistoryStore, MAX_STORED_BODY_BYTES};
pub use history_postgres::PostgresMessageHistoryStore;
pub use history_sqlite::SqliteMessageHistoryStore;
pub use http::router;
pub use process::{InboundProcessor, InboundProcessorConfig};
pub use work::{InboundWorkItem, InboundWorkStore, ReservationStatusWire, WorkStatus};
pub use work_postgres::PostgresInboundWorkStore;
pub use work_sqlite::SqliteInboundWorkStore;
