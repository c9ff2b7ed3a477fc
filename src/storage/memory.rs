//! In-memory event store
//!
//! Mirrors the SQLite semantics without a file, and adds knobs for
//! simulating outages: availability can be toggled, commits can be forced to
//! fail, and every operation can be slowed down to observe session
//! concurrency or probe timeouts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::EventStore;
use crate::error::{StorageError, StorageResult};
use crate::types::{ErrorStats, EventFilter, EventPage, ExecutionEvent, FunctionCount, PendingEvent};

/// Event store held entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<ExecutionEvent>>,
    unavailable: AtomicBool,
    failing_commits: AtomicUsize,
    latency_ms: AtomicU64,
    active_sessions: AtomicUsize,
    peak_sessions: AtomicUsize,
    pings: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a connectivity error (or recover)
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make the next `n` commits fail with a constraint error
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Hold every operation (including pings) for `delay` before completing
    pub fn set_latency(&self, delay: Duration) {
        self.latency_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of persisted rows
    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    /// Copy of all persisted rows in insertion order
    pub fn rows(&self) -> Vec<ExecutionEvent> {
        self.rows.lock().clone()
    }

    /// Highest number of sessions observed running at once
    pub fn peak_sessions(&self) -> usize {
        self.peak_sessions.load(Ordering::SeqCst)
    }

    /// Number of liveness probes received
    pub fn ping_count(&self) -> u64 {
        self.pings.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }

    /// Track one session for its whole duration, including the optional delay
    async fn session<T>(&self, op: impl FnOnce() -> StorageResult<T>) -> StorageResult<T> {
        let active = self.active_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_sessions.fetch_max(active, Ordering::SeqCst);

        self.simulate_latency().await;

        let result = self.check_available().and_then(|_| op());
        self.active_sessions.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn simulate_latency(&self) {
        let delay = self.latency_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn tenant_rows(&self, tenant_id: &str) -> Vec<ExecutionEvent> {
        self.rows
            .lock()
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn init_schema(&self) -> StorageResult<()> {
        self.check_available()
    }

    async fn ping(&self) -> StorageResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_available()
    }

    async fn insert_batch(&self, events: &[PendingEvent]) -> StorageResult<usize> {
        self.session(|| {
            let forced = self
                .failing_commits
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if forced {
                return Err(StorageError::Constraint("injected commit failure".to_string()));
            }
            if events.iter().any(|e| e.tenant_id.is_empty()) {
                return Err(StorageError::Constraint("tenant_id must not be empty".to_string()));
            }

            let mut rows = self.rows.lock();
            rows.extend(
                events
                    .iter()
                    .cloned()
                    .map(|e| e.into_persisted(Uuid::new_v4())),
            );
            Ok(events.len())
        })
        .await
    }

    async fn query(&self, tenant_id: &str, filter: &EventFilter) -> StorageResult<EventPage> {
        self.session(|| {
            let mut matching: Vec<ExecutionEvent> = self
                .tenant_rows(tenant_id)
                .into_iter()
                .filter(|e| filter.matches(e))
                .collect();
            let total = matching.len();

            // Stable sort keeps later inserts ahead on equal timestamps after reverse
            matching.reverse();
            matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

            let items = matching
                .into_iter()
                .skip(filter.offset)
                .take(filter.normalized_limit())
                .collect();
            Ok(EventPage { items, total })
        })
        .await
    }

    async fn error_stats(&self, tenant_id: &str) -> StorageResult<ErrorStats> {
        self.session(|| {
            let rows = self.tenant_rows(tenant_id);
            let errors = rows.iter().filter(|e| e.is_error()).count();
            Ok(ErrorStats::from_counts(rows.len() as u64, errors as u64))
        })
        .await
    }

    async fn top_functions(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<FunctionCount>> {
        self.session(|| {
            let mut counts: HashMap<String, u64> = HashMap::new();
            for event in self.tenant_rows(tenant_id) {
                if let Some(name) = event.function_name {
                    *counts.entry(name).or_insert(0) += 1;
                }
            }

            let mut top: Vec<FunctionCount> = counts
                .into_iter()
                .map(|(function_name, count)| FunctionCount {
                    function_name,
                    count,
                })
                .collect();
            top.sort_by(|a, b| {
                b.count
                    .cmp(&a.count)
                    .then_with(|| a.function_name.cmp(&b.function_name))
            });
            top.truncate(limit);
            Ok(top)
        })
        .await
    }
}
