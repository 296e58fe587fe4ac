//! Channel endpoints — the long-lived conversational surfaces.
//!
//! `create` binds a channel to an agent and starts its session;
//! `messages` resolves the channel's active session and runs a turn,
//! synthesizing the turn request the explicit endpoint takes verbatim.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use pa_domain::clock::{Clock as _, IdGenerator as _};
use pa_domain::session::{Channel, ChannelType, Session};
use pa_domain::turn::{ContentBlock, SubmitTurnRequest};
use pa_storage::{ChannelStore as _, SessionStore as _};

use crate::runtime::{estimate_tokens, spawn_turn};
use crate::state::AppState;

use super::api_error;
use super::turns::event_stream;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelRequest {
    pub channel_type: ChannelType,
    pub agent_id: String,
}

pub async fn create(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(body): Json<CreateChannelRequest>,
) -> impl IntoResponse {
    if state.config.agent(&body.agent_id).is_none() {
        return api_error(
            StatusCode::NOT_FOUND,
            format!("unknown agent: {}", body.agent_id),
        );
    }

    let session_id = state.ids.next_id().to_string();
    let conversation_id = state.ids.next_id().to_string();
    let session = Session::new(
        session_id.clone(),
        conversation_id.clone(),
        state.config.sessions.token_capacity,
    );
    if let Err(e) = state.storage.start_session(&session) {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    let channel = Channel {
        channel_id: channel_id.clone(),
        channel_type: body.channel_type,
        agent_id: body.agent_id,
        active_session_id: session_id,
        active_conversation_id: conversation_id,
        created_at: state.clock.now(),
    };
    if let Err(e) = state.storage.upsert_channel(&channel) {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    tracing::info!(
        channel_id = %channel.channel_id,
        agent_id = %channel.agent_id,
        session_id = %channel.active_session_id,
        "channel created"
    );
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize)]
pub struct ChannelMessageRequest {
    pub content: String,
}

pub async fn messages(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(body): Json<ChannelMessageRequest>,
) -> impl IntoResponse {
    let channel = match state.storage.get_channel(&channel_id) {
        Ok(Some(channel)) => channel,
        Ok(None) => {
            return api_error(
                StatusCode::NOT_FOUND,
                format!("unknown channel: {channel_id}"),
            );
        }
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let req = SubmitTurnRequest {
        turn_id: state.ids.next_id().to_string(),
        session_id: channel.active_session_id,
        conversation_id: channel.active_conversation_id,
        agent_id: channel.agent_id,
        content: body.content.clone(),
        content_blocks: vec![ContentBlock::Text {
            text: body.content.clone(),
        }],
        created_at: state.clock.now(),
        input_tokens: estimate_tokens(&body.content),
    };

    let handle = spawn_turn(&state, req);
    Sse::new(event_stream(handle))
        .keep_alive(KeepAlive::default())
        .into_response()
}
