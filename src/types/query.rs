//! Read-path request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ExecutionEvent;

/// Hard ceiling on page size
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Default number of functions returned by the top-functions report
pub const DEFAULT_TOP_FUNCTIONS: usize = 10;

/// Filtered, paginated query over a tenant's events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Accepted for compatibility; the authenticated tenant is always queried
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Inclusive lower bound
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Page size (default: 50, max: 1000)
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl EventFilter {
    /// Filter with default pagination and no predicates
    pub fn new() -> Self {
        Self {
            limit: default_limit(),
            ..Default::default()
        }
    }

    /// Normalize limit to max 1000
    pub fn normalized_limit(&self) -> usize {
        self.limit.min(MAX_QUERY_LIMIT)
    }

    /// Check an event against the filter predicates (pagination excluded)
    pub fn matches(&self, event: &ExecutionEvent) -> bool {
        if let Some(start) = self.start_time {
            if event.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if event.timestamp > end {
                return false;
            }
        }
        if let Some(ref name) = self.function_name {
            if event.function_name.as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(ref status) = self.status {
            if event.status.as_deref() != Some(status.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
    pub items: Vec<ExecutionEvent>,
    /// Number of matching events ignoring pagination
    pub total: usize,
}

/// Error-rate report for a tenant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub total_events: u64,
    pub error_events: u64,
    pub error_rate: f64,
}

impl ErrorStats {
    /// Build stats from raw counts, rounding the rate to 4 decimals
    pub fn from_counts(total_events: u64, error_events: u64) -> Self {
        let error_rate = if total_events > 0 {
            let rate = error_events as f64 / total_events as f64;
            (rate * 10_000.0).round() / 10_000.0
        } else {
            0.0
        };

        Self {
            total_events,
            error_events,
            error_rate,
        }
    }
}

/// Call count for one function name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCount {
    pub function_name: String,
    pub count: u64,
}
