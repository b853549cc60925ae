//! Shoptalk - tool-augmented conversational agent backend
//!
//! Routes customer messages to an LLM agent equipped with web search,
//! database lookup and document delivery tools, streams incremental
//! output as SSE and bridges the same agent into voice sessions.

pub mod adapters;
pub mod agents;
pub mod cli;
pub mod config;
pub mod services;
pub mod tools;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use adapters::http::{self as http_api, AppState};

/// Build the application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(http_api::root))
        .route("/health", get(http_api::health))
        .route("/chat", post(http_api::chat))
        .route("/chat/stream", post(http_api::chat_stream))
        .route("/diagnostics", post(http_api::diagnostics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
