//! Axum Router Configuration
//!
//! Both `/ws` and `/wss` lead to the same upgrade handler; `/wss` is the path
//! clients use when TLS is terminated in front of the service.

use crate::{state::AppState, ws::ws_handler};

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let handshake_timeout = app_state.config.handshake_timeout;

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/wss", get(ws_handler))
        // Bounds how long the handler takes to answer with the 101 response.
        // Reading the request head is not covered and relies on hyper's defaults.
        .layer(TimeoutLayer::new(handshake_timeout))
        .with_state(app_state)
}
