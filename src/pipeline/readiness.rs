//! Process-wide storage readiness flag

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Whether the backing store is currently believed reachable
///
/// Starts `unready`. Written by the health monitor, the startup bootstrap,
/// and the flush worker on connectivity failures; read by everyone else.
#[derive(Debug)]
pub struct Readiness {
    ready: AtomicBool,
    transitions: AtomicU64,
    changed_at: RwLock<DateTime<Utc>>,
}

/// Point-in-time view of the readiness flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessSnapshot {
    pub ready: bool,
    /// Number of state changes since startup
    pub transitions: u64,
    /// When the current state began (process start if never changed)
    pub changed_at: DateTime<Utc>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            transitions: AtomicU64::new(0),
            changed_at: RwLock::new(Utc::now()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Set `ready`; returns true if this was a transition
    pub fn mark_ready(&self) -> bool {
        self.set(true)
    }

    /// Set `unready`; returns true if this was a transition
    pub fn mark_unready(&self) -> bool {
        self.set(false)
    }

    fn set(&self, ready: bool) -> bool {
        let previous = self.ready.swap(ready, Ordering::AcqRel);
        if previous == ready {
            return false;
        }
        self.transitions.fetch_add(1, Ordering::Relaxed);
        *self.changed_at.write() = Utc::now();
        true
    }

    pub fn snapshot(&self) -> ReadinessSnapshot {
        ReadinessSnapshot {
            ready: self.is_ready(),
            transitions: self.transitions.load(Ordering::Relaxed),
            changed_at: *self.changed_at.read(),
        }
    }

    /// Advisory status label used in API responses
    pub fn label(&self) -> &'static str {
        if self.is_ready() {
            "connected"
        } else {
            "disconnected"
        }
    }
}
