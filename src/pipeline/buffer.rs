//! Event buffer between the gateway and the flush worker

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::types::PendingEvent;

/// Unbounded FIFO of accepted-but-unpersisted events
///
/// Enqueue never waits on storage. The buffer is volatile: whatever is still
/// queued when the process exits is lost.
#[derive(Debug, Default)]
pub struct EventBuffer {
    queue: Mutex<VecDeque<PendingEvent>>,
    enqueued_total: AtomicU64,
    requeued_total: AtomicU64,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event at the back
    pub fn enqueue(&self, event: PendingEvent) {
        self.queue.lock().push_back(event);
        self.enqueued_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Append events at the back, keeping their relative order
    pub fn enqueue_all(&self, events: impl IntoIterator<Item = PendingEvent>) -> usize {
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.extend(events);
        let added = queue.len() - before;
        drop(queue);

        self.enqueued_total.fetch_add(added as u64, Ordering::Relaxed);
        added
    }

    /// Remove up to `max` events from the front, oldest first
    ///
    /// Returns immediately; an empty buffer yields an empty batch.
    pub fn drain(&self, max: usize) -> Vec<PendingEvent> {
        let mut queue = self.queue.lock();
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    /// Put a drained batch back at the front, in its original order
    pub fn requeue(&self, batch: Vec<PendingEvent>) {
        if batch.is_empty() {
            return;
        }
        let n = batch.len() as u64;
        let mut queue = self.queue.lock();
        for event in batch.into_iter().rev() {
            queue.push_front(event);
        }
        drop(queue);

        self.requeued_total.fetch_add(n, Ordering::Relaxed);
    }

    /// Put a failed batch back at the tail, behind everything queued since
    ///
    /// A batch that keeps failing then cannot hold up the events behind it.
    pub fn requeue_back(&self, batch: Vec<PendingEvent>) {
        if batch.is_empty() {
            return;
        }
        let n = batch.len() as u64;
        self.queue.lock().extend(batch);
        self.requeued_total.fetch_add(n, Ordering::Relaxed);
    }

    /// Number of events currently buffered
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Events accepted since startup
    pub fn enqueued_total(&self) -> u64 {
        self.enqueued_total.load(Ordering::Relaxed)
    }

    /// Events pushed back after a deferred or failed flush
    pub fn requeued_total(&self) -> u64 {
        self.requeued_total.load(Ordering::Relaxed)
    }

    /// Copy of the buffered events, front first
    pub fn snapshot(&self) -> Vec<PendingEvent> {
        self.queue.lock().iter().cloned().collect()
    }
}
