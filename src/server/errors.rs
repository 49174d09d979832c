//! API error types mapped to HTTP status codes.
//!
//! Each [`ApiError`] variant maps to a specific HTTP status code and produces
//! a JSON response body `{"error": "message"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::warn;

use crate::query::QueryError;

/// Application-level error type that implements `IntoResponse`.
///
/// - `InvalidQuery` → 422
/// - `ServiceUnavailable` → 503
/// - `Internal` → 500
#[derive(Debug)]
pub enum ApiError {
    /// Missing or empty query (422).
    InvalidQuery(String),
    /// Embedding model or store failed (503).
    ServiceUnavailable(String),
    /// Stored data could not be processed (500).
    Internal(String),
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidInput(msg) => ApiError::InvalidQuery(msg),
            QueryError::UpstreamUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            QueryError::MalformedStoredVector(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidQuery(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), "Search failed: {}", message);
        }
        let body = axum::Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
