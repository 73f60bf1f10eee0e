//! Voice chat gateway: one `POST /api/generate` endpoint that forwards a
//! prompt to a hosted chat completion API behind a per-client rate limit,
//! throttle-aware retries and an overall deadline.

pub mod caller;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod upstream;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::{generate_handler, health_handler, metrics_handler};
use crate::state::AppState;

// creating the router with routes
pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/generate", post(generate_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .with_state(state)
}
