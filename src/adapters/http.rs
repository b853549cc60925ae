//! HTTP handlers

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::error;

use crate::services::{ChatService, DiagnosticsService};

/// Shared handler state, wired in `main`
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub diagnostics: Arc<DiagnosticsService>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DiagnosticsRequest {
    pub message: String,
    pub listing_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticsResponse {
    pub diagnostics: Vec<String>,
    pub listing_id: String,
    pub session_id: String,
    pub execution_time: f64,
}

fn default_user_id() -> String {
    "default".to_string()
}

/// Failure surface of the handlers; everything maps to 500 + detail
pub struct ApiError(String);

impl From<crate::agents::error::AgentError> for ApiError {
    fn from(err: crate::agents::error::AgentError) -> Self {
        Self(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.0 })),
        )
            .into_response()
    }
}

/// GET / - service banner
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "shoptalk" }))
}

/// GET /health - liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// POST /chat - complete reply in one response
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = state
        .chat
        .chat(&request.message, request.session_id, &request.user_id)
        .await?;
    Ok(Json(ChatResponse {
        response: reply.response,
        session_id: reply.session_id,
    }))
}

/// POST /chat/stream - SSE frame stream
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let frames = state
        .chat
        .chat_stream(request.message, request.session_id, request.user_id);
    let body = Body::from_stream(frames.map(|frame| Ok::<_, Infallible>(frame.to_sse())));

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));

    (StatusCode::OK, headers, body).into_response()
}

/// POST /diagnostics - structured diagnoses for a listing
pub async fn diagnostics(
    State(state): State<AppState>,
    Json(request): Json<DiagnosticsRequest>,
) -> Result<Json<DiagnosticsResponse>, ApiError> {
    let report = state
        .diagnostics
        .diagnose(
            &request.message,
            &request.listing_id,
            request.session_id,
            &request.user_id,
        )
        .await?;
    Ok(Json(DiagnosticsResponse {
        diagnostics: report.diagnostics,
        listing_id: report.listing_id,
        session_id: report.session_id,
        execution_time: report.execution_time,
    }))
}
