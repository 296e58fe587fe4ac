//! Provider-agnostic model streaming types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

/// A boxed async stream, used for model streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Token usage reported by a model at stream end.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Parts emitted by a streaming model call, in order.
///
/// The pipeline fans these into turn-stream events and folds the
/// non-delta parts into the final assistant turn.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelPart {
    TextDelta {
        text: String,
    },

    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input_json: Value,
    },

    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output_json: Value,
        is_error: bool,
    },

    /// Image/file output. Only `image/*` media types are folded into the
    /// assistant turn; everything else is dropped.
    Media {
        media_type: String,
        source: String,
        alt_text: Option<String>,
    },

    /// Stream end with the finish reason and usage accounting.
    Finished {
        finish_reason: Option<String>,
        usage: Option<TokenUsage>,
    },
}

/// One message of model-call input.
#[derive(Clone, Debug)]
pub struct ModelMessage {
    pub role: crate::turn::ParticipantRole,
    pub content: String,
}

/// A provider-agnostic streaming request.
#[derive(Clone, Debug, Default)]
pub struct ModelRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<ModelMessage>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub seed: Option<u64>,
}
