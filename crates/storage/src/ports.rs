//! Typed repository interfaces over the runtime's entities.
//!
//! Ports are synchronous (`rusqlite` is synchronous and every call is a
//! short, per-call transaction); callers in async contexts treat them as
//! quick critical sections.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use pa_domain::agent::AgentRecord;
use pa_domain::audit::AuditEntry;
use pa_domain::memory::{MemoryItem, MemoryPage, MemoryQuery};
use pa_domain::schedule::{Schedule, ScheduleDelta, ScheduledExecution};
use pa_domain::session::{Channel, Session};
use pa_domain::turn::{ContentBlock, ParticipantRole, Turn};
use pa_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub trait AgentStore: Send + Sync {
    fn upsert_agent(&self, agent: &AgentRecord) -> Result<()>;

    fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>>;

    /// Reserve `tokens` against the agent's budget window and return the
    /// remaining allowance.
    ///
    /// When `budget_reset_at` has passed (or was never set), the counter
    /// resets to zero and the window advances by one quota period before
    /// the consume is applied. Fails with `TokenBudgetExceeded` when the
    /// request does not fit; reserved tokens are never refunded.
    fn consume_token_budget(
        &self,
        agent_id: &str,
        tokens: u64,
        now: DateTime<Utc>,
    ) -> Result<u64>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions + turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub trait SessionStore: Send + Sync {
    /// Create the session. Calling again with an existing id is a no-op.
    fn start_session(&self, session: &Session) -> Result<()>;

    fn get_session(&self, session_id: &str) -> Result<Option<Session>>;

    /// Apply a signed token delta to the session's context window and
    /// return the new `tokens_used`. Negative deltas clamp at zero;
    /// exceeding `token_capacity` fails with `ContextWindowExceeded`
    /// carrying the attempted value.
    fn update_context_window(&self, session_id: &str, delta: i64) -> Result<u64>;
}

/// A turn about to be appended; the store assigns `turn_index`.
#[derive(Clone, Debug)]
pub struct NewTurn {
    pub turn_id: String,
    pub session_id: String,
    pub conversation_id: String,
    pub participant_role: ParticipantRole,
    pub message_id: String,
    pub message_content: String,
    pub content_blocks: Vec<ContentBlock>,
    pub model_finish_reason: Option<String>,
    pub model_usage_json: Option<Value>,
    pub created_at: DateTime<Utc>,
}

pub trait TurnStore: Send + Sync {
    /// Append a turn at the session's current length. Returns the
    /// assigned index, or `None` when `turn_id` already exists (the
    /// append is a no-op).
    fn append_turn(&self, turn: &NewTurn) -> Result<Option<u64>>;

    /// All turns of a session in `turn_index` order.
    fn list_turns(&self, session_id: &str) -> Result<Vec<Turn>>;

    fn turn_count(&self, session_id: &str) -> Result<u64>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channels
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub trait ChannelStore: Send + Sync {
    fn upsert_channel(&self, channel: &Channel) -> Result<()>;

    fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Schedules + executions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub trait ScheduleStore: Send + Sync {
    fn upsert_schedule(&self, schedule: &Schedule) -> Result<()>;

    fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>>;

    fn list_schedules(&self) -> Result<Vec<Schedule>>;
}

pub trait ExecutionStore: Send + Sync {
    /// The command lane's transactional primitive, keyed by
    /// `execution.execution_id`.
    ///
    /// First submission: inserts the execution row, applies `delta` to
    /// the schedule, appends `completed_audit`, returns `true`. Repeat
    /// submission: appends `ignored_audit` only, returns `false`. All
    /// writes of one call happen in a single transaction; a failed
    /// transaction leaves no audit entry behind.
    fn submit_execution(
        &self,
        execution: &ScheduledExecution,
        delta: &ScheduleDelta,
        completed_audit: &AuditEntry,
        ignored_audit: &AuditEntry,
    ) -> Result<bool>;

    fn get_execution(&self, execution_id: Uuid) -> Result<Option<ScheduledExecution>>;

    /// Executions of one schedule in `created_at` (dispatch) order.
    fn list_executions(&self, schedule_id: &str) -> Result<Vec<ScheduledExecution>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audit + memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub trait AuditStore: Send + Sync {
    fn append_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Every entry, ordered by `created_at`.
    fn list_audit(&self) -> Result<Vec<AuditEntry>>;

    fn list_audit_for_agent(&self, agent_id: &str) -> Result<Vec<AuditEntry>>;
}

pub trait MemoryStore: Send + Sync {
    fn encode_memory(&self, item: &MemoryItem) -> Result<()>;

    fn search_memory(&self, query: &MemoryQuery) -> Result<MemoryPage>;

    /// Delete the agent's items with `created_at < cutoff`; returns the
    /// deleted count.
    fn forget_memory(&self, agent_id: &str, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Everything a fully wired runtime needs from persistence.
pub trait Storage:
    AgentStore
    + SessionStore
    + TurnStore
    + ChannelStore
    + ScheduleStore
    + ExecutionStore
    + AuditStore
    + MemoryStore
{
}

impl<T> Storage for T where
    T: AgentStore
        + SessionStore
        + TurnStore
        + ChannelStore
        + ScheduleStore
        + ExecutionStore
        + AuditStore
        + MemoryStore
{
}
