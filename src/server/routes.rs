//! Route table for the analysis server.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/analyze", post(handlers::analyze))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
