//! Event query endpoint

use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};

use super::{degraded, AppError, Tenant};
use crate::api::state::AppState;
use crate::types::{EventFilter, EventPage};

/// POST /v1/query - Filtered, paginated events for the calling tenant
///
/// `tenant_id` in the body is ignored; callers only ever see their own
/// events.
pub async fn query_events(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    Json(filter): Json<EventFilter>,
) -> Result<Response, AppError> {
    if !state.readiness.is_ready() {
        return Ok(degraded(EventPage::default()));
    }

    let _permit = state.session().await?;
    let page = state.store.query(&tenant, &filter).await?;
    Ok(Json(page).into_response())
}
