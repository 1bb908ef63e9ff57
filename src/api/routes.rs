//! API Routes
//!
//! Configures the Axum router with all inspection endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, get_entry_handler, health_handler, invalidate_handler,
    invalidate_pattern_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /entries/:key` - Read an entry with its timestamps
/// - `DELETE /entries/:key` - Invalidate one key
/// - `DELETE /entries` - Clear the cache
/// - `POST /invalidate` - Invalidate every key matching a pattern
/// - `GET /stats` - Get cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/entries", delete(clear_handler))
        .route(
            "/entries/:key",
            get(get_entry_handler).delete(invalidate_handler),
        )
        .route("/invalidate", post(invalidate_pattern_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
