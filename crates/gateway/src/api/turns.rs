//! SSE turn endpoint.
//!
//! `POST /sessions/:session_id/turns` accepts a `SubmitTurnRequest` and
//! streams the turn's events as `event: <type>\ndata: <json>` frames.
//! The endpoint always answers 200; fatal pipeline errors arrive as the
//! final `turn.failed` frame before the stream closes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_core::Stream;
use tokio::sync::broadcast::error::RecvError;

use pa_domain::turn::{SubmitTurnRequest, TurnStreamEvent};

use crate::runtime::{spawn_turn, TurnHandle};
use crate::state::AppState;

use super::api_error;

pub async fn submit(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<SubmitTurnRequest>,
) -> impl IntoResponse {
    if req.session_id != session_id {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "body sessionId {} does not match path {session_id}",
                req.session_id
            ),
        );
    }

    let handle = spawn_turn(&state, req);
    Sse::new(event_stream(handle))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Frame a turn's events for SSE: replayed buffer first, then the live
/// tail until a terminal event closes the stream.
pub(crate) fn event_stream(
    handle: Arc<TurnHandle>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let (snapshot, mut rx) = handle.snapshot_and_subscribe();

        let mut done = false;
        for event in snapshot {
            done = event.is_terminal();
            yield Ok(frame(&event));
            if done {
                break;
            }
        }

        while !done {
            match rx.recv().await {
                Ok(event) => {
                    done = event.is_terminal();
                    yield Ok(frame(&event));
                }
                // A lagged receiver skips frames rather than aborting
                // the stream; the replay buffer still has them.
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    }
}

fn frame(event: &TurnStreamEvent) -> Event {
    Event::default()
        .event(event.event_type())
        .data(serde_json::to_string(event).unwrap_or_default())
}
