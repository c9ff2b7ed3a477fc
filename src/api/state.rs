//! Shared application state for HTTP handlers

use std::sync::Arc;

use crate::auth::TenantAuth;
use crate::error::StorageResult;
use crate::pipeline::{
    EventBuffer, FlushWorker, IngestPipeline, IngestionGateway, Readiness, SessionGate,
    SessionPermit,
};
use crate::storage::EventStore;

/// Handles to the pipeline pieces the handlers touch
pub struct AppState {
    /// Request-path entry point for writes
    pub gateway: IngestionGateway,

    /// Backing store for the read endpoints
    pub store: Arc<dyn EventStore>,

    /// Shared with the flush worker so reads and flushes share one bound
    pub gate: SessionGate,

    pub readiness: Arc<Readiness>,

    pub buffer: Arc<EventBuffer>,

    pub flusher: Arc<FlushWorker>,

    pub auth: TenantAuth,
}

impl AppState {
    /// Wire handler state to a pipeline
    pub fn new(pipeline: &IngestPipeline, auth: TenantAuth) -> Self {
        Self {
            gateway: pipeline.gateway(),
            store: Arc::clone(pipeline.store()),
            gate: pipeline.gate().clone(),
            readiness: Arc::clone(pipeline.readiness()),
            buffer: Arc::clone(pipeline.buffer()),
            flusher: Arc::clone(pipeline.flusher()),
            auth,
        }
    }

    /// Reserve a storage session for a read
    pub async fn session(&self) -> StorageResult<SessionPermit> {
        self.gate.acquire().await
    }
}
