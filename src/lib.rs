use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod bridge;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod scheduler;

use bridge::BridgeService;

#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<BridgeService>,
}

impl AppState {
    pub fn new(bridge: Arc<BridgeService>) -> Self {
        Self { bridge }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/status", get(http::handlers::status))
        .route("/ready", post(http::handlers::ready))
        .route("/disconnect", post(http::handlers::disconnect))
        .route("/poll", get(http::handlers::poll))
        .route("/response", post(http::handlers::response))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
