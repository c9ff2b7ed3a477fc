//! REST API module for HTTP endpoints
//!
//! - `POST /v1/ingest` - Buffer a list of events
//! - `POST /v1/query` - Filtered, paginated event read
//! - `GET /v1/stats/errors` - Error rate for the tenant
//! - `GET /v1/stats/top-functions` - Most frequent function names
//! - `GET /v1/status` - Pipeline counters
//! - `GET /v1/test-auth` - Echo the resolved tenant
//!
//! Every route resolves the caller through the [`Tenant`] extractor. Read
//! routes answer with an empty result and `X-DB-Status: disconnected` while
//! storage is unready instead of waiting on it.

pub mod ingest;
pub mod query;
pub mod stats;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use super::state::AppState;
use crate::error::{AuthError, IngestError, StorageError};

/// Response header carrying the advisory storage state
pub const DB_STATUS_HEADER: &str = "X-DB-Status";

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "BAD_REQUEST".to_string(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "UNAUTHORIZED".to_string(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "STORAGE_UNAVAILABLE".to_string(),
        }
    }
}

/// Handler failure, mapped to a status code and an [`ApiError`] body
#[derive(Debug)]
pub enum AppError {
    Ingest(IngestError),
    Auth(AuthError),
    Storage(StorageError),
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        AppError::Ingest(e)
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Auth(e)
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::Storage(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Ingest(e) => (StatusCode::BAD_REQUEST, ApiError::bad_request(e.to_string())),
            AppError::Auth(e) => (StatusCode::UNAUTHORIZED, ApiError::unauthorized(e.to_string())),
            AppError::Storage(e) => {
                error!(error = %e, "Read request failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ApiError::unavailable(e.to_string()),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Tenant resolved from request credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Tenant {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Tenant(state.auth.resolve(&parts.headers)?))
    }
}

/// 200 response flagged as served without storage
pub fn degraded<T: Serialize>(body: T) -> Response {
    let mut response = Json(body).into_response();
    response
        .headers_mut()
        .insert(DB_STATUS_HEADER, HeaderValue::from_static("disconnected"));
    response
}
