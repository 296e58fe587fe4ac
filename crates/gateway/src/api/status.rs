//! Liveness and runtime-status probes.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub const SERVICE_NAME: &str = "personal-agent";
const ONTOLOGY_VERSION: &str = "v1";
const BRANCH: &str = "main";

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn runtime_status(State(state): State<AppState>) -> impl IntoResponse {
    let phase = if state.cancel.is_cancelled() {
        "stopping"
    } else {
        "running"
    };
    Json(serde_json::json!({
        "service": SERVICE_NAME,
        "phase": phase,
        "ontologyVersion": ONTOLOGY_VERSION,
        "architectureVersion": env!("CARGO_PKG_VERSION"),
        "branch": BRANCH,
    }))
}
