//! HTTP surface.
//!
//! - `GET  /health`                        — liveness probe
//! - `POST /channels/:channel_id/create`   — bind a channel to an agent
//! - `POST /channels/:channel_id/messages` — SSE turn stream via channel
//! - `POST /sessions/:session_id/turns`    — SSE turn stream, explicit
//! - `GET  /runtime/status`                — service phase and versions

pub mod channels;
pub mod status;
pub mod turns;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(status::health))
        .route("/runtime/status", get(status::runtime_status))
        .route("/channels/:channel_id/create", post(channels::create))
        .route("/channels/:channel_id/messages", post(channels::messages))
        .route("/sessions/:session_id/turns", post(turns::submit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
