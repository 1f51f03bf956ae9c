//! API Routes
//!
//! Configures the Axum router: admin endpoints under `/_cache`, everything else served
//! through the cache.

use axum::{
    routing::{get, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    asset_handler, clear_handler, health_handler, set_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/_cache/health", get(health_handler))
        .route("/_cache/stats", get(stats_handler))
        .route("/_cache/entries", put(set_handler).delete(clear_handler))
        .fallback(asset_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
