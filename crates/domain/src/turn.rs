//! Turns, content blocks, and the turn-stream event wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sequence number carried by `turn.failed` frames. Terminal failures
/// always sort after any live sequence number and stay representable in
/// JSON consumers (JavaScript `MAX_SAFE_INTEGER`).
pub const FAILURE_SEQUENCE: u64 = 9_007_199_254_740_991;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn entity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Who uttered a turn.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParticipantRole {
    User,
    Assistant,
    System,
    Tool,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::System => "System",
            Self::Tool => "Tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "User" => Some(Self::User),
            "Assistant" => Some(Self::Assistant),
            "System" => Some(Self::System),
            "Tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

/// One ordered piece of a turn's content.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    #[serde(rename_all = "camelCase")]
    Text { text: String },

    #[serde(rename_all = "camelCase")]
    ToolUse {
        tool_call_id: String,
        tool_name: String,
        input_json: Value,
    },

    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output_json: Value,
        is_error: bool,
    },

    #[serde(rename_all = "camelCase")]
    Image {
        media_type: String,
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt_text: Option<String>,
    },
}

/// A single participant utterance appended to a session.
///
/// `(session_id, turn_index)` and `(session_id, turn_id)` are unique;
/// `turn_index` is dense and assigned at append time as the session's
/// current length. Appending a duplicate `turn_id` is a no-op.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub turn_id: String,
    pub session_id: String,
    pub conversation_id: String,
    pub turn_index: u64,
    pub participant_role: ParticipantRole,
    pub message_id: String,
    pub message_content: String,
    #[serde(default)]
    pub content_blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub model_finish_reason: Option<String>,
    #[serde(default)]
    pub model_usage_json: Option<Value>,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn submission
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Request body for `POST /sessions/:session_id/turns`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTurnRequest {
    pub turn_id: String,
    pub session_id: String,
    pub conversation_id: String,
    pub agent_id: String,
    pub content: String,
    #[serde(default)]
    pub content_blocks: Vec<ContentBlock>,
    pub created_at: DateTime<Utc>,
    pub input_tokens: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn stream events (SSE wire format)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted while a turn is processed.
///
/// The `sequence` is per-turn monotonic and dense, starting at 0 with
/// `turn.started`; a terminal frame is either `turn.completed` or
/// `turn.failed` (the latter carries [`FAILURE_SEQUENCE`]).
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum TurnStreamEvent {
    #[serde(rename = "turn.started", rename_all = "camelCase")]
    TurnStarted {
        sequence: u64,
        turn_id: String,
        session_id: String,
    },

    #[serde(rename = "assistant.delta", rename_all = "camelCase")]
    AssistantDelta {
        sequence: u64,
        turn_id: String,
        delta: String,
    },

    #[serde(rename = "tool.call", rename_all = "camelCase")]
    ToolCall {
        sequence: u64,
        turn_id: String,
        tool_call_id: String,
        tool_name: String,
        input_json: Value,
    },

    #[serde(rename = "tool.result", rename_all = "camelCase")]
    ToolResult {
        sequence: u64,
        turn_id: String,
        tool_call_id: String,
        tool_name: String,
        output_json: Value,
        is_error: bool,
    },

    #[serde(rename = "turn.completed", rename_all = "camelCase")]
    TurnCompleted {
        sequence: u64,
        turn_id: String,
        finish_reason: Option<String>,
    },

    #[serde(rename = "turn.failed", rename_all = "camelCase")]
    TurnFailed {
        sequence: u64,
        turn_id: String,
        session_id: String,
        error_code: String,
        message: String,
    },
}

impl TurnStreamEvent {
    pub fn sequence(&self) -> u64 {
        match self {
            Self::TurnStarted { sequence, .. }
            | Self::AssistantDelta { sequence, .. }
            | Self::ToolCall { sequence, .. }
            | Self::ToolResult { sequence, .. }
            | Self::TurnCompleted { sequence, .. }
            | Self::TurnFailed { sequence, .. } => *sequence,
        }
    }

    /// The SSE `event:` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnStarted { .. } => "turn.started",
            Self::AssistantDelta { .. } => "assistant.delta",
            Self::ToolCall { .. } => "tool.call",
            Self::ToolResult { .. } => "tool.result",
            Self::TurnCompleted { .. } => "turn.completed",
            Self::TurnFailed { .. } => "turn.failed",
        }
    }

    /// Whether this event closes the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TurnCompleted { .. } | Self::TurnFailed { .. })
    }
}
