//! Aggregate statistics endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{degraded, AppError, Tenant};
use crate::api::state::AppState;
use crate::pipeline::{FlushStats, ReadinessSnapshot};
use crate::types::{ErrorStats, FunctionCount, DEFAULT_TOP_FUNCTIONS};

/// Query parameters for GET /v1/stats/top-functions
#[derive(Debug, Deserialize)]
pub struct TopFunctionsParams {
    /// Number of functions to return (default: 10, max: 100)
    #[serde(default = "default_top")]
    pub limit: usize,
}

fn default_top() -> usize {
    DEFAULT_TOP_FUNCTIONS
}

/// Session gate usage
#[derive(Debug, Serialize)]
pub struct GateStatus {
    pub capacity: usize,
    pub in_use: usize,
    pub peak: usize,
}

/// Response for GET /v1/status
#[derive(Debug, Serialize)]
pub struct PipelineStatus {
    pub readiness: ReadinessSnapshot,
    pub buffered: usize,
    pub enqueued_total: u64,
    pub requeued_total: u64,
    pub flush: FlushStats,
    pub sessions: GateStatus,
}

/// GET /v1/stats/errors - Error rate over all of the tenant's events
pub async fn error_stats(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
) -> Result<Response, AppError> {
    if !state.readiness.is_ready() {
        return Ok(degraded(ErrorStats::default()));
    }

    let _permit = state.session().await?;
    let stats = state.store.error_stats(&tenant).await?;
    Ok(Json(stats).into_response())
}

/// GET /v1/stats/top-functions - Most frequent function names
pub async fn top_functions(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    Query(params): Query<TopFunctionsParams>,
) -> Result<Response, AppError> {
    if !state.readiness.is_ready() {
        return Ok(degraded(Vec::<FunctionCount>::new()));
    }

    let _permit = state.session().await?;
    let top = state
        .store
        .top_functions(&tenant, params.limit.clamp(1, 100))
        .await?;
    Ok(Json(top).into_response())
}

/// GET /v1/status - Buffer, flush and session counters
///
/// Served from memory; never touches storage.
pub async fn pipeline_status(
    State(state): State<Arc<AppState>>,
    Tenant(_): Tenant,
) -> Json<PipelineStatus> {
    Json(PipelineStatus {
        readiness: state.readiness.snapshot(),
        buffered: state.buffer.len(),
        enqueued_total: state.buffer.enqueued_total(),
        requeued_total: state.buffer.requeued_total(),
        flush: state.flusher.stats(),
        sessions: GateStatus {
            capacity: state.gate.capacity(),
            in_use: state.gate.in_use(),
            peak: state.gate.peak(),
        },
    })
}
