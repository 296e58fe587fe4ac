//! Sessions and channels.
//!
//! A session is a bounded context window over one conversation; a channel
//! is the long-lived conversational surface (CLI, Web) that points at the
//! currently active session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded context window over one conversation.
///
/// `tokens_used` stays within `[0, token_capacity]` at all times; only
/// `update_context_window` and turn appends mutate it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub conversation_id: String,
    pub token_capacity: u64,
    #[serde(default)]
    pub tokens_used: u64,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        conversation_id: impl Into<String>,
        token_capacity: u64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            conversation_id: conversation_id.into(),
            token_capacity,
            tokens_used: 0,
        }
    }
}

/// Kind of conversational surface a channel fronts.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Cli,
    Web,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Web => "web",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cli" => Some(Self::Cli),
            "web" => Some(Self::Web),
            _ => None,
        }
    }
}

/// A long-lived conversational surface bound to an agent and its active
/// session/conversation. Upserted on create, read on resume.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub channel_id: String,
    pub channel_type: ChannelType,
    pub agent_id: String,
    pub active_session_id: String,
    pub active_conversation_id: String,
    pub created_at: DateTime<Utc>,
}
