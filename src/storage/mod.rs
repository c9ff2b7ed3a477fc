//! Storage collaborator
//!
//! The pipeline and the read endpoints only see the [`EventStore`] trait:
//!
//! - `insert_batch`: one transaction, all-or-nothing
//! - `ping`: trivial liveness query used by the health monitor
//! - `query` / `error_stats` / `top_functions`: tenant-scoped reads
//!
//! Concurrency against the backing store is bounded by the caller through
//! [`SessionGate`](crate::pipeline::SessionGate), not by the store itself.

mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::types::{ErrorStats, EventFilter, EventPage, FunctionCount, PendingEvent};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Durable backing store for execution events
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Create tables and indexes if they do not exist yet
    async fn init_schema(&self) -> StorageResult<()>;

    /// Cheap round-trip proving the store is reachable
    async fn ping(&self) -> StorageResult<()>;

    /// Insert every event in one transaction and commit
    ///
    /// Each event gets a fresh id. On error nothing is persisted.
    async fn insert_batch(&self, events: &[PendingEvent]) -> StorageResult<usize>;

    /// Filtered, paginated read, newest first
    async fn query(&self, tenant_id: &str, filter: &EventFilter) -> StorageResult<EventPage>;

    /// Total vs. `status == "error"` counts for a tenant
    async fn error_stats(&self, tenant_id: &str) -> StorageResult<ErrorStats>;

    /// Most frequently reported function names for a tenant
    async fn top_functions(&self, tenant_id: &str, limit: usize)
        -> StorageResult<Vec<FunctionCount>>;
}
