//! Turn processing pipeline.
//!
//! [`spawn_turn`] deduplicates by `turn_id` and runs one worker task per
//! turn; the worker serialises on the session lock, runs the gate checks
//! (context window, token budget), appends the user turn, streams the
//! model's parts as ordered events, and folds the result into a
//! persisted assistant turn.
//!
//! Event sequences are dense and strictly increasing per turn. Failures
//! terminate the stream with a single `turn.failed` frame carrying the
//! JSON-safe failure sequence; a failure during the gate checks makes
//! that frame the first and only event.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::Instrument;

use pa_domain::clock::{Clock as _, IdGenerator as _};
use pa_domain::stream::{ModelMessage, ModelPart, ModelRequest, TokenUsage};
use pa_domain::turn::{
    ContentBlock, ParticipantRole, SubmitTurnRequest, TurnStreamEvent, FAILURE_SEQUENCE,
};
use pa_domain::{Error, Result};
use pa_storage::{AgentStore as _, NewTurn, SessionStore as _, TurnStore as _};

use crate::state::AppState;

use super::workers::TurnHandle;

/// Start (or join) the worker for `req.turn_id` and return its handle.
///
/// The first caller spawns the pipeline; concurrent and repeat callers
/// for the same turn observe the identical event stream.
pub fn spawn_turn(state: &AppState, req: SubmitTurnRequest) -> Arc<TurnHandle> {
    let (handle, spawned) = state.turn_workers.get_or_create(&req.turn_id);
    if !spawned {
        return handle;
    }

    let state = state.clone();
    let worker = handle.clone();
    let span = tracing::info_span!(
        "turn",
        turn_id = %req.turn_id,
        session_id = %req.session_id,
    );
    tokio::spawn(
        async move {
            // Strict per-session ordering: one turn at a time.
            let _permit = state.session_locks.acquire(&req.session_id).await;
            run_pipeline(&state, &req, &worker).await;
        }
        .instrument(span),
    );
    handle
}

async fn run_pipeline(state: &AppState, req: &SubmitTurnRequest, out: &TurnHandle) {
    // Gate checks and the user-turn append happen before the stream
    // opens; their failure is the stream's only event.
    if let Err(e) = preflight(state, req) {
        tracing::info!(error_code = e.error_code(), "turn rejected before start");
        out.push(failure(req, &e));
        return;
    }

    let mut sequence: u64 = 0;
    out.push(TurnStreamEvent::TurnStarted {
        sequence,
        turn_id: req.turn_id.clone(),
        session_id: req.session_id.clone(),
    });
    sequence += 1;

    match stream_assistant(state, req, out, &mut sequence).await {
        Ok(finish_reason) => {
            out.push(TurnStreamEvent::TurnCompleted {
                sequence,
                turn_id: req.turn_id.clone(),
                finish_reason,
            });
        }
        Err(e) => {
            tracing::warn!(error_code = e.error_code(), error = %e, "turn failed");
            out.push(failure(req, &e));
        }
    }
}

/// Steps 1–4: load session, reserve context window and token budget,
/// append the user turn (duplicate `turn_id` is a no-op).
fn preflight(state: &AppState, req: &SubmitTurnRequest) -> Result<()> {
    state
        .storage
        .get_session(&req.session_id)?
        .ok_or_else(|| Error::SessionNotFound {
            session_id: req.session_id.clone(),
        })?;

    state
        .storage
        .update_context_window(&req.session_id, req.input_tokens as i64)?;

    // Budget is reserved here and never refunded, even if the model call
    // is cancelled later.
    state
        .storage
        .consume_token_budget(&req.agent_id, req.input_tokens, state.clock.now())?;

    state.storage.append_turn(&NewTurn {
        turn_id: req.turn_id.clone(),
        session_id: req.session_id.clone(),
        conversation_id: req.conversation_id.clone(),
        participant_role: ParticipantRole::User,
        message_id: state.ids.next_id().to_string(),
        message_content: req.content.clone(),
        content_blocks: req.content_blocks.clone(),
        model_finish_reason: None,
        model_usage_json: None,
        created_at: req.created_at,
    })?;

    Ok(())
}

/// Steps 6–7: stream the model and persist the assistant turn.
async fn stream_assistant(
    state: &AppState,
    req: &SubmitTurnRequest,
    out: &TurnHandle,
    sequence: &mut u64,
) -> Result<Option<String>> {
    let agent_cfg =
        state
            .config
            .agent(&req.agent_id)
            .ok_or_else(|| Error::TurnProcessingError {
                turn_id: req.turn_id.clone(),
                reason: format!("agent not configured: {}", req.agent_id),
            })?;

    let model = state
        .models
        .resolve(agent_cfg.model.provider, &agent_cfg.model.model_id)?;

    let history = state.storage.list_turns(&req.session_id)?;
    let request = ModelRequest {
        system_prompt: Some(agent_cfg.persona.system_prompt.clone()),
        messages: history
            .iter()
            .map(|t| ModelMessage {
                role: t.participant_role,
                content: t.message_content.clone(),
            })
            .collect(),
        temperature: Some(agent_cfg.generation.temperature),
        max_output_tokens: Some(agent_cfg.generation.max_output_tokens),
        top_p: agent_cfg.generation.top_p,
        seed: agent_cfg.generation.seed,
    };

    let mut stream = model.stream_turn(request).await?;

    let mut text_buf = String::new();
    let mut tail_blocks: Vec<ContentBlock> = Vec::new();
    let mut finish_reason: Option<String> = None;
    let mut usage: Option<TokenUsage> = None;

    loop {
        let next = tokio::select! {
            _ = state.cancel.cancelled() => {
                return Err(Error::TurnProcessingError {
                    turn_id: req.turn_id.clone(),
                    reason: "runtime shutting down".to_owned(),
                });
            }
            part = stream.next() => part,
        };
        let Some(part) = next else { break };

        match part? {
            ModelPart::TextDelta { text } => {
                out.push(TurnStreamEvent::AssistantDelta {
                    sequence: *sequence,
                    turn_id: req.turn_id.clone(),
                    delta: text.clone(),
                });
                *sequence += 1;
                text_buf.push_str(&text);
            }
            ModelPart::ToolCall {
                tool_call_id,
                tool_name,
                input_json,
            } => {
                out.push(TurnStreamEvent::ToolCall {
                    sequence: *sequence,
                    turn_id: req.turn_id.clone(),
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    input_json: input_json.clone(),
                });
                *sequence += 1;
                tail_blocks.push(ContentBlock::ToolUse {
                    tool_call_id,
                    tool_name,
                    input_json,
                });
            }
            ModelPart::ToolResult {
                tool_call_id,
                tool_name,
                output_json,
                is_error,
            } => {
                out.push(TurnStreamEvent::ToolResult {
                    sequence: *sequence,
                    turn_id: req.turn_id.clone(),
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    output_json: output_json.clone(),
                    is_error,
                });
                *sequence += 1;
                tail_blocks.push(ContentBlock::ToolResult {
                    tool_call_id,
                    tool_name,
                    output_json,
                    is_error,
                });
            }
            ModelPart::Media {
                media_type,
                source,
                alt_text,
            } => {
                // Only image output folds into the turn; other media is
                // dropped.
                if media_type.starts_with("image/") {
                    tail_blocks.push(ContentBlock::Image {
                        media_type,
                        source,
                        alt_text,
                    });
                }
            }
            ModelPart::Finished {
                finish_reason: reason,
                usage: reported,
            } => {
                finish_reason = reason;
                usage = reported;
            }
        }
    }

    // Assemble the assistant turn: concatenated text first, then tool
    // and image blocks in arrival order.
    let mut content_blocks = Vec::new();
    if !text_buf.is_empty() {
        content_blocks.push(ContentBlock::Text {
            text: text_buf.clone(),
        });
    }
    content_blocks.extend(tail_blocks);

    let usage_json = usage.as_ref().map(serde_json::to_value).transpose()?;
    state.storage.append_turn(&NewTurn {
        turn_id: state.ids.next_id().to_string(),
        session_id: req.session_id.clone(),
        conversation_id: req.conversation_id.clone(),
        participant_role: ParticipantRole::Assistant,
        message_id: state.ids.next_id().to_string(),
        message_content: text_buf,
        content_blocks,
        model_finish_reason: finish_reason.clone(),
        model_usage_json: usage_json,
        created_at: state.clock.now(),
    })?;

    if let Some(u) = &usage {
        if u.output_tokens > 0 {
            state
                .storage
                .update_context_window(&req.session_id, u.output_tokens as i64)?;
        }
    }

    Ok(finish_reason)
}

fn failure(req: &SubmitTurnRequest, e: &Error) -> TurnStreamEvent {
    TurnStreamEvent::TurnFailed {
        sequence: FAILURE_SEQUENCE,
        turn_id: req.turn_id.clone(),
        session_id: req.session_id.clone(),
        error_code: e.error_code().to_owned(),
        message: e.to_string(),
    }
}
