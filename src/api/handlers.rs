//! API Handlers
//!
//! HTTP request handlers for the asset and admin endpoints.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::models::{
    ClearRequest, ClearResponse, ErrorResponse, HealthResponse, SetRequest, SetResponse,
    StatsResponse,
};
use crate::pipeline::{Coordinator, FetchRequest};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    /// Creates a coordinator with default strategies from configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: Config) -> Self {
        Self::new(Coordinator::new(config))
    }
}

/// Fallback handler: serves any other path through the cache.
///
/// `Accept-Encoding` picks the variant and `If-None-Match` may turn the answer into a 304.
pub async fn asset_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let resource = state
        .coordinator
        .fetch(FetchRequest::from_http(target, &headers))
        .await;
    debug!(
        url = %resource.url,
        status = resource.status.as_u16(),
        hit = resource.hit,
        "asset served"
    );

    resource.into_response()
}

/// Handler for PUT /_cache/entries
///
/// Runs an explicit update and reports the produced encodings.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Response> {
    if let Some(error_msg) = req.validate() {
        return Ok((StatusCode::BAD_REQUEST, Json(ErrorResponse::new(error_msg))).into_response());
    }

    let url = req.url.clone();
    let artifact = state.coordinator.set(req.into_options()).await?;

    Ok(Json(SetResponse::new(url, &artifact)).into_response())
}

/// Handler for DELETE /_cache/entries?url=
pub async fn clear_handler(
    State(state): State<AppState>,
    Query(req): Query<ClearRequest>,
) -> Json<ClearResponse> {
    let cleared = state
        .coordinator
        .clear(&req.url, req.encoding.as_deref())
        .await;

    Json(ClearResponse {
        url: req.url,
        cleared,
    })
}

/// Handler for GET /_cache/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.coordinator.stats().await;
    Json(StatsResponse::new(&stats, state.coordinator.is_ready()))
}

/// Handler for GET /_cache/health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
