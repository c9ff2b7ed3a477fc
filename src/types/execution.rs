//! Execution event types
//!
//! An event moves through three shapes on its way to storage:
//!
//! - [`NewEvent`]: what a client submits; `tenant_id` and `timestamp` may be absent
//! - [`PendingEvent`]: stamped by the gateway and held in the buffer
//! - [`ExecutionEvent`]: a persisted row with its storage-assigned `id`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Structured event payload (a JSON object)
pub type Payload = Map<String, Value>;

/// Event as submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Owning tenant; stamped from the authenticated caller when absent
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub event_type: String,
    pub payload: Payload,
    /// Event time; stamped with the enqueue instant when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl NewEvent {
    /// Create an event with only the required fields set
    pub fn new(event_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            tenant_id: None,
            event_type: event_type.into(),
            payload,
            timestamp: None,
            function_name: None,
            latency_ms: None,
            status: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_function(mut self, function_name: impl Into<String>) -> Self {
        self.function_name = Some(function_name.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: i64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Fill in missing tenant and timestamp
    ///
    /// An empty `tenant_id` counts as absent.
    pub fn stamp(self, tenant_id: &str, now: DateTime<Utc>) -> PendingEvent {
        let tenant_id = match self.tenant_id {
            Some(t) if !t.is_empty() => t,
            _ => tenant_id.to_string(),
        };

        PendingEvent {
            tenant_id,
            timestamp: self.timestamp.unwrap_or(now),
            event_type: self.event_type,
            payload: self.payload,
            function_name: self.function_name,
            latency_ms: self.latency_ms,
            status: self.status,
        }
    }
}

/// Accepted event waiting in the buffer for a flush
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub payload: Payload,
    pub function_name: Option<String>,
    pub latency_ms: Option<i64>,
    pub status: Option<String>,
}

impl PendingEvent {
    /// Attach a storage id, producing the persisted form
    pub fn into_persisted(self, id: Uuid) -> ExecutionEvent {
        ExecutionEvent {
            id,
            tenant_id: self.tenant_id,
            timestamp: self.timestamp,
            event_type: self.event_type,
            payload: self.payload,
            function_name: self.function_name,
            latency_ms: self.latency_ms,
            status: self.status,
        }
    }
}

/// Persisted execution event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub id: Uuid,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub payload: Payload,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ExecutionEvent {
    /// Whether this event counts towards the error rate
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }
}
