//! HTTP route handlers and router configuration

mod admin;
mod export;
mod messages;
mod records;
mod sessions;
mod sync;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the main application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        // Health + clock
        .route("/health", get(admin::health))
        .route("/ts", get(admin::ts))
        // Record ingestion and queries
        .route("/records", post(records::create).get(records::list))
        .route("/records/batch", post(records::create_batch))
        .route("/records/batchGlobal", post(records::create_batch_global))
        .route("/records/multiDevice", get(records::multi_device))
        // Message ingestion and cursor reads
        .route("/messages", post(messages::create))
        .route("/messages/next", get(messages::next))
        .route("/messages/nextGlobal", get(messages::next_global))
        // Session directory
        .route("/sessions/create", post(sessions::create))
        .route("/sessions", get(sessions::list))
        .route("/sessions/current", get(sessions::current))
        // Replication status
        .route("/sync/status", get(sync::status))
        // CSV export
        .route(
            "/export/:environment_key/:session_name/:device/records",
            get(export::records_csv),
        )
        .with_state(state.clone());

    // Add middleware
    let router = router.layer(TraceLayer::new_for_http());

    // Add CORS if enabled
    if state.config.cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}
