//! Telemetry Ingest
//!
//! A multi-tenant ingestion service for execution events (LLM calls, tool
//! invocations, function traces). Writes are acknowledged as soon as they are
//! buffered in memory; a background worker persists them in transactional
//! batches, and keeps them buffered while storage is unreachable.
//!
//! # Features
//!
//! - **Never blocks writers**: ingestion only validates, stamps and enqueues
//! - **At-least-once persistence**: failed batches are requeued, not dropped
//! - **Degraded mode**: a health monitor tracks storage reachability and
//!   reads short-circuit while it is down
//! - **Bounded sessions**: flushes and reads share one concurrency cap
//! - **Tenant isolation**: every read is scoped to the authenticated tenant
//!
//! # Modules
//!
//! - `types`: Event records and read-path types
//! - `pipeline`: Buffer, session gate, health monitor, flush worker, gateway
//! - `storage`: `EventStore` trait with SQLite and in-memory backends
//! - `auth`: Tenant resolution from API key headers or bearer tokens
//! - `api`: Axum router and handlers
//! - `config`: TOML + environment configuration
//! - `error`: Error types
//! - `utils`: Timestamp helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use telemetry_ingest::{IngestPipeline, NewEvent, PipelineConfig, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(SqliteStore::new("./data/events.db"));
//!     let pipeline = IngestPipeline::new(store, PipelineConfig::default());
//!     pipeline.bootstrap().await;
//!     let handle = pipeline.spawn();
//!
//!     let event = NewEvent::new("llm_call", Default::default()).with_function("summarize");
//!     pipeline.gateway().ingest("acme", vec![event]).unwrap();
//!
//!     handle.shutdown().await;
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use api::{create_router, AppState};
pub use auth::TenantAuth;
pub use config::ServerConfig;
pub use error::{AuthError, ConfigError, IngestError, StorageError, StorageResult};
pub use pipeline::{
    EventBuffer, FlushConfig, FlushWorker, HealthMonitor, IngestAck, IngestPipeline,
    IngestionGateway, PipelineConfig, PipelineHandle, Readiness, SessionGate,
};
pub use storage::{EventStore, MemoryStore, SqliteStore};
pub use types::{
    ErrorStats, EventFilter, EventPage, ExecutionEvent, FunctionCount, NewEvent, Payload,
    PendingEvent,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
