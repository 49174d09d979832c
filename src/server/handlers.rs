//! HTTP request handlers and application state.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::errors::ApiError;
use crate::models::SearchResponse;
use crate::query::SearchEngine;

/// Shared state handed to every handler.
///
/// Built once at startup; the engine (and the model it holds) is read-only
/// for the lifetime of the server.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn SearchEngine>,
}

impl AppState {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self { engine }
    }
}

/// Query string of `GET /search`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
}

/// `GET /search?query=<text>`
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params
        .query
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::InvalidQuery("query parameter is required".to_string()))?;

    let response = state.engine.search(&query).await?;
    Ok(Json(response))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
