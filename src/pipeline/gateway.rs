//! Request-facing ingestion entry point

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{EventBuffer, Readiness};
use crate::error::IngestError;
use crate::types::NewEvent;
use crate::utils::now_utc;

/// Acknowledgement returned once events are buffered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestAck {
    /// Always `"accepted"`
    pub status: String,
    /// Number of events queued by this call
    pub queued: usize,
    /// Advisory storage state at request time: `"connected"` or `"disconnected"`
    pub db: String,
}

impl IngestAck {
    /// Whether storage looked unready when the request was accepted
    pub fn degraded(&self) -> bool {
        self.db != "connected"
    }
}

/// Validates, stamps and enqueues events; never waits on storage
#[derive(Debug, Clone)]
pub struct IngestionGateway {
    buffer: Arc<EventBuffer>,
    readiness: Arc<Readiness>,
    max_events: usize,
}

impl IngestionGateway {
    pub fn new(buffer: Arc<EventBuffer>, readiness: Arc<Readiness>, max_events: usize) -> Self {
        Self {
            buffer,
            readiness,
            max_events,
        }
    }

    /// Per-call event limit
    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Accept a list of events on behalf of `tenant_id`
    ///
    /// The whole list is rejected if it is over the limit or any event is
    /// malformed; nothing is enqueued in that case. Otherwise every event is
    /// stamped and enqueued in the given order.
    pub fn ingest(&self, tenant_id: &str, events: Vec<NewEvent>) -> Result<IngestAck, IngestError> {
        if events.len() > self.max_events {
            return Err(IngestError::TooManyEvents {
                count: events.len(),
                max: self.max_events,
            });
        }

        if let Some(index) = events.iter().position(|e| e.event_type.trim().is_empty()) {
            return Err(IngestError::InvalidEvent {
                index,
                reason: "event_type must not be empty".to_string(),
            });
        }

        let now = now_utc();
        let queued = self
            .buffer
            .enqueue_all(events.into_iter().map(|e| e.stamp(tenant_id, now)));

        info!(queued, tenant = tenant_id, "Queued events");

        Ok(IngestAck {
            status: "accepted".to_string(),
            queued,
            db: self.readiness.label().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;
    use chrono::{TimeZone, Utc};

    fn gateway() -> (IngestionGateway, Arc<EventBuffer>, Arc<Readiness>) {
        let buffer = Arc::new(EventBuffer::new());
        let readiness = Arc::new(Readiness::new());
        let gateway = IngestionGateway::new(Arc::clone(&buffer), Arc::clone(&readiness), 100);
        (gateway, buffer, readiness)
    }

    fn events(n: usize) -> Vec<NewEvent> {
        (0..n)
            .map(|i| NewEvent::new(format!("e{}", i), Payload::new()))
            .collect()
    }

    #[test]
    fn test_queued_count_matches_input() {
        let (gateway, buffer, _) = gateway();

        for n in [0, 1, 42, 100] {
            let ack = gateway.ingest("t1", events(n)).unwrap();
            assert_eq!(ack.queued, n);
            assert_eq!(ack.status, "accepted");
        }
        assert_eq!(buffer.len(), 143);
    }

    #[test]
    fn test_oversized_request_enqueues_nothing() {
        let (gateway, buffer, _) = gateway();

        let err = gateway.ingest("t1", events(101)).unwrap_err();
        assert_eq!(err, IngestError::TooManyEvents { count: 101, max: 100 });
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_blank_event_type_rejects_whole_request() {
        let (gateway, buffer, _) = gateway();
        let mut batch = events(3);
        batch[1].event_type = "  ".to_string();

        let err = gateway.ingest("t1", batch).unwrap_err();
        assert!(matches!(err, IngestError::InvalidEvent { index: 1, .. }));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_events_are_stamped_in_order() {
        let (gateway, buffer, _) = gateway();
        let fixed = Utc.with_ymd_and_hms(2023, 7, 1, 0, 0, 0).unwrap();
        let batch = vec![
            NewEvent::new("first", Payload::new()),
            NewEvent::new("second", Payload::new())
                .with_tenant("explicit")
                .with_timestamp(fixed),
        ];

        gateway.ingest("caller", batch).unwrap();
        let buffered = buffer.snapshot();

        assert_eq!(buffered[0].event_type, "first");
        assert_eq!(buffered[0].tenant_id, "caller");
        assert!(buffered[0].timestamp > fixed);

        assert_eq!(buffered[1].event_type, "second");
        assert_eq!(buffered[1].tenant_id, "explicit");
        assert_eq!(buffered[1].timestamp, fixed);
    }

    #[test]
    fn test_readiness_hint_reflects_current_flag() {
        let (gateway, _, readiness) = gateway();

        let ack = gateway.ingest("t1", events(1)).unwrap();
        assert_eq!(ack.db, "disconnected");
        assert!(ack.degraded());

        readiness.mark_ready();
        let ack = gateway.ingest("t1", events(1)).unwrap();
        assert_eq!(ack.db, "connected");
        assert!(!ack.degraded());
    }
}
