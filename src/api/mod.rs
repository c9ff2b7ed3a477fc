//! API module for HTTP endpoints
//!
//! This module exposes the ingestion pipeline and the tenant-scoped read
//! endpoints over HTTP.

pub mod http;
pub mod rest;
pub mod state;

pub use http::create_router;
pub use state::AppState;
