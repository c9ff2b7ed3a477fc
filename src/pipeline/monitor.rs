//! Storage health monitor
//!
//! Probes the backing store on a schedule and keeps the shared [`Readiness`]
//! flag current. Transitions are logged at `info`/`warn`; repeated failures
//! while already unready only at `debug`, so a long outage does not flood the
//! log.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Readiness;
use crate::error::StorageError;
use crate::storage::EventStore;

/// When to run the next probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeSchedule {
    /// Same period regardless of outcome
    Fixed { interval: Duration },
    /// Probe quickly for the first `fast_attempts` consecutive failures,
    /// then fall back to `slow_interval` until a success resets the count
    Backoff {
        fast_interval: Duration,
        slow_interval: Duration,
        fast_attempts: u32,
    },
}

impl Default for ProbeSchedule {
    fn default() -> Self {
        ProbeSchedule::Backoff {
            fast_interval: Duration::from_secs(10),
            slow_interval: Duration::from_secs(30),
            fast_attempts: 5,
        }
    }
}

impl ProbeSchedule {
    /// Delay before the next probe given the current failure streak
    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        match *self {
            ProbeSchedule::Fixed { interval } => interval,
            ProbeSchedule::Backoff {
                fast_interval,
                slow_interval,
                fast_attempts,
            } => {
                if consecutive_failures > 0 && consecutive_failures <= fast_attempts {
                    fast_interval
                } else {
                    slow_interval
                }
            }
        }
    }
}

/// Configuration for the health monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub schedule: ProbeSchedule,
    /// A probe slower than this counts as a failure
    pub probe_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            schedule: ProbeSchedule::default(),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Background prober that owns the ready/unready transitions
pub struct HealthMonitor {
    store: Arc<dyn EventStore>,
    readiness: Arc<Readiness>,
    config: MonitorConfig,
    consecutive_failures: AtomicU32,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn EventStore>, readiness: Arc<Readiness>, config: MonitorConfig) -> Self {
        Self {
            store,
            readiness,
            config,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Current failure streak (0 after any success)
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Delay the run loop will wait before its next probe
    ///
    /// Readiness dropped by someone else (a failed flush) with no failed
    /// probe yet counts as one failure, so recovery is checked at the fast
    /// cadence.
    pub fn next_delay(&self) -> Duration {
        let mut failures = self.consecutive_failures();
        if failures == 0 && !self.readiness.is_ready() {
            failures = 1;
        }
        self.config.schedule.next_delay(failures)
    }

    /// Run one probe and update readiness; returns whether it succeeded
    pub async fn probe_once(&self) -> bool {
        let timeout = self.config.probe_timeout;
        let result = match tokio::time::timeout(timeout, self.store.ping()).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(timeout)),
        };

        match result {
            Ok(()) => {
                let previous_failures = self.consecutive_failures.swap(0, Ordering::SeqCst);
                if self.readiness.mark_ready() {
                    info!(previous_failures, "Storage is reachable, flushing enabled");
                }
                true
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if self.readiness.mark_unready() {
                    warn!(error = %e, "Storage became unreachable, running in degraded mode");
                } else {
                    debug!(error = %e, failures, "Storage still unreachable");
                }
                false
            }
        }
    }

    /// Probe until cancelled
    ///
    /// Waits one schedule period before the first probe; the startup
    /// bootstrap has already probed once.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(schedule = ?self.config.schedule, "Health monitor started");

        loop {
            let delay = self.next_delay();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.probe_once() => {}
            }
        }

        info!("Health monitor stopped");
    }
}
