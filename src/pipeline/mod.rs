//! Ingestion buffering and flush subsystem
//!
//! # Architecture
//!
//! ```text
//!  request ──► IngestionGateway ──► EventBuffer ──► FlushWorker ──► EventStore
//!                     ▲                                 │  ▲            ▲
//!                     │ (advisory)          SessionGate ┘  │            │
//!                     └──────────── Readiness ◄────────────┴── HealthMonitor
//! ```
//!
//! - `EventBuffer`: unbounded FIFO of accepted events
//! - `SessionGate`: caps concurrent storage sessions (flush + reads)
//! - `Readiness`: process-wide reachable/unreachable flag
//! - `HealthMonitor`: background prober that drives `Readiness`
//! - `FlushWorker`: background loop persisting batches, requeuing on failure
//! - `IngestionGateway`: request-path validation, stamping and enqueue
//!
//! The two background tasks share nothing but the buffer and the readiness
//! flag, and both stop on the same [`CancellationToken`].

mod buffer;
mod flusher;
mod gate;
mod gateway;
mod monitor;
mod readiness;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::storage::EventStore;

pub use buffer::EventBuffer;
pub use flusher::{FlushConfig, FlushOutcome, FlushStats, FlushWorker};
pub use gate::{SessionGate, SessionPermit};
pub use gateway::{IngestAck, IngestionGateway};
pub use monitor::{HealthMonitor, MonitorConfig, ProbeSchedule};
pub use readiness::{Readiness, ReadinessSnapshot};

/// Knobs for the whole subsystem
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub flush: FlushConfig,
    pub monitor: MonitorConfig,
    /// Session gate capacity
    pub max_sessions: usize,
    /// Per-request event limit enforced by the gateway
    pub max_events_per_request: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            flush: FlushConfig::default(),
            monitor: MonitorConfig::default(),
            max_sessions: 10,
            max_events_per_request: 100,
        }
    }
}

/// Owns the shared pieces and wires the background tasks
pub struct IngestPipeline {
    buffer: Arc<EventBuffer>,
    gate: SessionGate,
    readiness: Arc<Readiness>,
    store: Arc<dyn EventStore>,
    monitor: Arc<HealthMonitor>,
    flusher: Arc<FlushWorker>,
    config: PipelineConfig,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn EventStore>, config: PipelineConfig) -> Self {
        let buffer = Arc::new(EventBuffer::new());
        let gate = SessionGate::new(config.max_sessions);
        let readiness = Arc::new(Readiness::new());

        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&store),
            Arc::clone(&readiness),
            config.monitor.clone(),
        ));
        let flusher = Arc::new(FlushWorker::new(
            Arc::clone(&buffer),
            gate.clone(),
            Arc::clone(&readiness),
            Arc::clone(&store),
            config.flush.clone(),
        ));

        Self {
            buffer,
            gate,
            readiness,
            store,
            monitor,
            flusher,
            config,
        }
    }

    /// Create the schema and run the first probe
    ///
    /// Never fails: an unreachable store leaves readiness `unready` and the
    /// health monitor keeps trying in the background.
    pub async fn bootstrap(&self) -> bool {
        if let Err(e) = self.store.init_schema().await {
            warn!(error = %e, "Schema bootstrap failed, starting in degraded mode");
        }
        let ready = self.monitor.probe_once().await;
        if !ready {
            warn!("Storage unreachable at startup, events will be buffered");
        }
        ready
    }

    /// Start the health monitor and flush worker
    pub fn spawn(&self) -> PipelineHandle {
        let cancel = CancellationToken::new();
        let monitor = tokio::spawn(Arc::clone(&self.monitor).run(cancel.clone()));
        let flusher = tokio::spawn(Arc::clone(&self.flusher).run(cancel.clone()));

        PipelineHandle {
            cancel,
            monitor,
            flusher,
            gate: self.gate.clone(),
            buffer: Arc::clone(&self.buffer),
        }
    }

    /// Request-path entry point sharing this pipeline's buffer and readiness
    pub fn gateway(&self) -> IngestionGateway {
        IngestionGateway::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.readiness),
            self.config.max_events_per_request,
        )
    }

    pub fn buffer(&self) -> &Arc<EventBuffer> {
        &self.buffer
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    pub fn readiness(&self) -> &Arc<Readiness> {
        &self.readiness
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn flusher(&self) -> &Arc<FlushWorker> {
        &self.flusher
    }
}

/// Running background tasks
pub struct PipelineHandle {
    cancel: CancellationToken,
    monitor: JoinHandle<()>,
    flusher: JoinHandle<()>,
    gate: SessionGate,
    buffer: Arc<EventBuffer>,
}

impl PipelineHandle {
    /// Token shared by both tasks
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop both tasks and wait for them
    ///
    /// An in-flight flush transaction finishes first. The session gate is
    /// closed afterwards so late read requests fail fast instead of touching
    /// a store that is about to be dropped. Returns the number of events left
    /// unflushed.
    pub async fn shutdown(self) -> usize {
        self.cancel.cancel();

        let (monitor, flusher) = tokio::join!(self.monitor, self.flusher);
        if let Err(e) = monitor {
            warn!(error = %e, "Health monitor task ended abnormally");
        }
        if let Err(e) = flusher {
            warn!(error = %e, "Flush worker task ended abnormally");
        }

        self.gate.close();

        let remaining = self.buffer.len();
        if remaining > 0 {
            warn!(remaining, "Shutting down with unflushed events; they will be lost");
        } else {
            info!("Pipeline stopped with an empty buffer");
        }
        remaining
    }
}

/// Shorthand used by tests and the binary for millisecond settings
pub(crate) fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
