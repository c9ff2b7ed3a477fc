//! Session gate bounding concurrent storage sessions

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{StorageError, StorageResult};

/// Counting gate shared by the flush worker and the read endpoints
///
/// Keeps the number of open storage sessions at or below the backing pool's
/// ceiling. Waiters are admitted in FIFO order.
#[derive(Debug, Clone)]
pub struct SessionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_use: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// One admitted session; the slot is released when this is dropped
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
    in_use: Arc<AtomicUsize>,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SessionGate {
    /// Create a gate admitting at most `capacity` sessions at once
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_use: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot
    ///
    /// Fails only after [`close`](Self::close).
    pub async fn acquire(&self) -> StorageResult<SessionPermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| StorageError::GateClosed)?;

        let now = self.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        Ok(SessionPermit {
            _permit: permit,
            in_use: Arc::clone(&self.in_use),
        })
    }

    /// Stop admitting sessions; pending and future `acquire` calls fail
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Configured maximum
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sessions currently admitted
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Highest number of sessions ever admitted at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}
