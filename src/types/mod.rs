//! Data types for the ingestion service
//!
//! This module contains the event records and read-path types shared by the
//! pipeline, the storage backends, and the HTTP layer.

mod execution;
mod query;

pub use execution::{ExecutionEvent, NewEvent, Payload, PendingEvent};
pub use query::{
    ErrorStats, EventFilter, EventPage, FunctionCount, DEFAULT_TOP_FUNCTIONS, MAX_QUERY_LIMIT,
};
