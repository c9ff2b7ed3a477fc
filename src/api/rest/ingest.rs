//! Ingestion and auth-check endpoints

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::{AppError, Tenant, DB_STATUS_HEADER};
use crate::api::state::AppState;
use crate::types::NewEvent;

/// Response for GET /v1/test-auth
#[derive(Debug, Serialize)]
pub struct AuthCheckResponse {
    pub message: String,
    pub tenant: String,
}

/// POST /v1/ingest - Buffer events for the calling tenant
///
/// Returns 202 as soon as the events are queued; persistence happens in the
/// background. When storage looks unreachable the response also carries
/// `X-DB-Status: disconnected`.
pub async fn ingest_events(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    Json(events): Json<Vec<NewEvent>>,
) -> Result<Response, AppError> {
    let ack = state.gateway.ingest(&tenant, events)?;
    let degraded = ack.degraded();

    let mut response = (StatusCode::ACCEPTED, Json(ack)).into_response();
    if degraded {
        response
            .headers_mut()
            .insert(DB_STATUS_HEADER, HeaderValue::from_static("disconnected"));
    }
    Ok(response)
}

/// GET /v1/test-auth - Echo the resolved tenant
pub async fn test_auth(Tenant(tenant): Tenant) -> Json<AuthCheckResponse> {
    Json(AuthCheckResponse {
        message: "Authenticated".to_string(),
        tenant,
    })
}
