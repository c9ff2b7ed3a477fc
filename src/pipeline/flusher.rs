//! Batch flush worker
//!
//! A single long-lived loop moving events from the [`EventBuffer`] into the
//! store:
//!
//! ```text
//! collect ──► evaluate ──► flush ──► committed ─┐
//!    ▲           │           └─────► requeued ──┤
//!    │           └ unready ► deferred ──────────┤
//!    └──────────────────── idle wait ◄──────────┘
//! ```
//!
//! Every batch that is not committed goes back into the buffer, so an
//! accepted event is only ever gone once its transaction commits. Deferred
//! batches and batches lost to a connectivity failure return to the front;
//! any other failure sends the batch to the back so it cannot stall the
//! events queued behind it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{EventBuffer, Readiness, SessionGate};
use crate::storage::EventStore;

/// Configuration for the flush worker
#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// Maximum events per transaction
    pub batch_size: usize,
    /// Pause between iterations, whatever the outcome
    pub idle_interval: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            idle_interval: Duration::from_secs(1),
        }
    }
}

/// What one iteration of the loop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Buffer was empty
    Idle,
    /// Storage unready; this many events went back to the buffer untouched
    Deferred(usize),
    /// This many events were committed
    Committed(usize),
    /// The transaction failed; this many events went back to the buffer
    Requeued(usize),
    /// Shutdown arrived while waiting for a session; events went back
    Cancelled(usize),
}

#[derive(Debug, Default)]
struct FlushCounters {
    batches_committed: AtomicU64,
    events_committed: AtomicU64,
    batches_requeued: AtomicU64,
    events_deferred: AtomicU64,
}

/// Cumulative flush counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushStats {
    pub batches_committed: u64,
    pub events_committed: u64,
    pub batches_requeued: u64,
    pub events_deferred: u64,
}

/// Drains the buffer into storage in bounded, transactional batches
pub struct FlushWorker {
    buffer: Arc<EventBuffer>,
    gate: SessionGate,
    readiness: Arc<Readiness>,
    store: Arc<dyn EventStore>,
    config: FlushConfig,
    counters: FlushCounters,
}

impl FlushWorker {
    pub fn new(
        buffer: Arc<EventBuffer>,
        gate: SessionGate,
        readiness: Arc<Readiness>,
        store: Arc<dyn EventStore>,
        config: FlushConfig,
    ) -> Self {
        Self {
            buffer,
            gate,
            readiness,
            store,
            config,
            counters: FlushCounters::default(),
        }
    }

    pub fn stats(&self) -> FlushStats {
        FlushStats {
            batches_committed: self.counters.batches_committed.load(Ordering::Relaxed),
            events_committed: self.counters.events_committed.load(Ordering::Relaxed),
            batches_requeued: self.counters.batches_requeued.load(Ordering::Relaxed),
            events_deferred: self.counters.events_deferred.load(Ordering::Relaxed),
        }
    }

    /// Run one collect/evaluate/flush pass without the idle wait
    pub async fn flush_once(&self, cancel: &CancellationToken) -> FlushOutcome {
        let batch = self.buffer.drain(self.config.batch_size);
        if batch.is_empty() {
            return FlushOutcome::Idle;
        }
        let count = batch.len();

        if !self.readiness.is_ready() {
            self.buffer.requeue(batch);
            self.counters
                .events_deferred
                .fetch_add(count as u64, Ordering::Relaxed);
            debug!(count, "Storage unready, deferring flush");
            return FlushOutcome::Deferred(count);
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.buffer.requeue(batch);
                return FlushOutcome::Cancelled(count);
            }
            permit = self.gate.acquire() => permit,
        };
        let _permit = match permit {
            Ok(permit) => permit,
            Err(e) => {
                self.buffer.requeue(batch);
                warn!(error = %e, count, "No storage session available, batch requeued");
                return FlushOutcome::Cancelled(count);
            }
        };

        match self.store.insert_batch(&batch).await {
            Ok(committed) => {
                self.counters
                    .batches_committed
                    .fetch_add(1, Ordering::Relaxed);
                self.counters
                    .events_committed
                    .fetch_add(committed as u64, Ordering::Relaxed);
                info!(count = committed, "Flushed events to storage");
                FlushOutcome::Committed(committed)
            }
            Err(e) => {
                error!(error = %e, count, "Failed to flush events, batch requeued");
                if e.is_connectivity() {
                    if self.readiness.mark_unready() {
                        warn!(error = %e, "Storage became unreachable during flush");
                    }
                    self.buffer.requeue(batch);
                } else {
                    self.buffer.requeue_back(batch);
                }
                self.counters
                    .batches_requeued
                    .fetch_add(1, Ordering::Relaxed);
                FlushOutcome::Requeued(count)
            }
        }
    }

    /// Flush until cancelled
    ///
    /// A transaction already in progress when cancellation arrives runs to
    /// commit or rollback; the loop exits at the following idle wait.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            batch_size = self.config.batch_size,
            idle_ms = self.config.idle_interval.as_millis() as u64,
            "Flush worker started"
        );

        loop {
            self.flush_once(&cancel).await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.idle_interval) => {}
            }
        }

        let remaining = self.buffer.len();
        if remaining > 0 {
            warn!(remaining, "Flush worker stopped with unflushed events");
        } else {
            info!("Flush worker stopped");
        }
    }
}
