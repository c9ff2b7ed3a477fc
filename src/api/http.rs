//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::rest::{ingest, query, stats};
use super::state::AppState;

/// Response for GET /health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// `"connected"` or `"disconnected"`
    pub db: &'static str,
    /// Events waiting in the buffer
    pub buffered: usize,
    pub version: &'static str,
}

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration - allow all origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Write path
        .route("/v1/ingest", post(ingest::ingest_events))
        // Read path
        .route("/v1/query", post(query::query_events))
        .route("/v1/stats/errors", get(stats::error_stats))
        .route("/v1/stats/top-functions", get(stats::top_functions))
        .route("/v1/status", get(stats::pipeline_status))
        .route("/v1/test-auth", get(ingest::test_auth))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
///
/// Liveness only: reports the cached readiness flag without touching storage.
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        db: state.readiness.label(),
        buffered: state.buffer.len(),
        version: crate::VERSION,
    })
}
