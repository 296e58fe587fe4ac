/// Shared error type used across all runtime crates.
///
/// The first group of variants is the recoverable, caller-visible error
/// surface (budget, quota, sandbox, lookup, and context-window failures).
/// `ClusterEntityError` wraps storage and transport failures at the entity
/// boundary; `TurnProcessingError` is the pipeline-internal catch-all.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("token budget exceeded for agent {agent_id}: requested {requested_tokens}, remaining {remaining_tokens}")]
    TokenBudgetExceeded {
        agent_id: String,
        requested_tokens: u64,
        remaining_tokens: u64,
    },

    #[error("tool quota exceeded for agent {agent_id}, tool {tool_name}")]
    ToolQuotaExceeded {
        agent_id: String,
        tool_name: String,
        remaining_invocations: u32,
    },

    #[error("sandbox violation for agent {agent_id}: {reason}")]
    SandboxViolation { agent_id: String, reason: String },

    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("context window exceeded for session {session_id}: {attempted_tokens_used} of {token_capacity}")]
    ContextWindowExceeded {
        session_id: String,
        token_capacity: u64,
        attempted_tokens_used: u64,
    },

    #[error("{entity_type} entity: {reason}")]
    ClusterEntityError { entity_type: String, reason: String },

    #[error("turn {turn_id}: {reason}")]
    TurnProcessingError { turn_id: String, reason: String },

    #[error("model {provider}/{model_id}: {message}")]
    Model {
        provider: String,
        model_id: String,
        message: String,
    },

    #[error("config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a storage-layer failure at the entity boundary.
    pub fn entity(entity_type: &str, reason: impl std::fmt::Display) -> Self {
        Self::ClusterEntityError {
            entity_type: entity_type.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// The tag surfaced as `errorCode` on `turn.failed` events.
    ///
    /// Anything outside the caller-visible surface collapses to
    /// `TurnProcessingError`.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TokenBudgetExceeded { .. } => "TokenBudgetExceeded",
            Self::ToolQuotaExceeded { .. } => "ToolQuotaExceeded",
            Self::SandboxViolation { .. } => "SandboxViolation",
            Self::SessionNotFound { .. } => "SessionNotFound",
            Self::ContextWindowExceeded { .. } => "ContextWindowExceeded",
            Self::ClusterEntityError { .. } => "ClusterEntityError",
            _ => "TurnProcessingError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
