//! In-memory backend — one guarded map per entity type.
//!
//! Readers get cloned snapshots; writers update in place under the
//! entity's lock. `submit_execution` takes its three locks in a fixed
//! order (executions, schedules, audits) so the command-lane write is
//! atomic with respect to every other accessor.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use pa_domain::agent::AgentRecord;
use pa_domain::audit::AuditEntry;
use pa_domain::memory::{MemoryItem, MemoryPage, MemoryQuery};
use pa_domain::schedule::{Schedule, ScheduleDelta, ScheduledExecution};
use pa_domain::session::{Channel, Session};
use pa_domain::turn::Turn;
use pa_domain::{Error, Result};

use crate::ports::{
    AgentStore, AuditStore, ChannelStore, ExecutionStore, MemoryStore, NewTurn, ScheduleStore,
    SessionStore, TurnStore,
};
use crate::rules;

#[derive(Default)]
struct TurnLog {
    by_session: HashMap<String, Vec<Turn>>,
    /// Global turn-id set for duplicate-append detection.
    ids: HashSet<String>,
}

#[derive(Default)]
struct ExecutionLog {
    by_id: HashMap<Uuid, usize>,
    /// Rows in insertion (`created_at`) order.
    rows: Vec<ScheduledExecution>,
}

/// Volatile storage backend, used by tests and `agent chat` without a
/// database file.
#[derive(Default)]
pub struct MemoryBackend {
    agents: RwLock<HashMap<String, AgentRecord>>,
    sessions: RwLock<HashMap<String, Session>>,
    turns: RwLock<TurnLog>,
    channels: RwLock<HashMap<String, Channel>>,
    schedules: RwLock<HashMap<String, Schedule>>,
    executions: Mutex<ExecutionLog>,
    audits: Mutex<Vec<AuditEntry>>,
    memory: RwLock<HashMap<String, MemoryItem>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

// ── Agents ──────────────────────────────────────────────────────────

impl AgentStore for MemoryBackend {
    fn upsert_agent(&self, agent: &AgentRecord) -> Result<()> {
        self.agents
            .write()
            .insert(agent.agent_id.clone(), agent.clone());
        Ok(())
    }

    fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>> {
        Ok(self.agents.read().get(agent_id).cloned())
    }

    fn consume_token_budget(
        &self,
        agent_id: &str,
        tokens: u64,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| Error::entity("agent", format!("not found: {agent_id}")))?;
        rules::consume_budget(agent, tokens, now)
    }
}

// ── Sessions ────────────────────────────────────────────────────────

impl SessionStore for MemoryBackend {
    fn start_session(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .entry(session.session_id.clone())
            .or_insert_with(|| session.clone());
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    fn update_context_window(&self, session_id: &str, delta: i64) -> Result<u64> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_owned(),
            })?;
        rules::apply_window_delta(session, delta)
    }
}

// ── Turns ───────────────────────────────────────────────────────────

impl TurnStore for MemoryBackend {
    fn append_turn(&self, turn: &NewTurn) -> Result<Option<u64>> {
        let mut log = self.turns.write();
        if log.ids.contains(&turn.turn_id) {
            return Ok(None);
        }
        log.ids.insert(turn.turn_id.clone());

        let entries = log.by_session.entry(turn.session_id.clone()).or_default();
        let turn_index = entries.len() as u64;
        entries.push(Turn {
            turn_id: turn.turn_id.clone(),
            session_id: turn.session_id.clone(),
            conversation_id: turn.conversation_id.clone(),
            turn_index,
            participant_role: turn.participant_role,
            message_id: turn.message_id.clone(),
            message_content: turn.message_content.clone(),
            content_blocks: turn.content_blocks.clone(),
            model_finish_reason: turn.model_finish_reason.clone(),
            model_usage_json: turn.model_usage_json.clone(),
            created_at: turn.created_at,
        });
        Ok(Some(turn_index))
    }

    fn list_turns(&self, session_id: &str) -> Result<Vec<Turn>> {
        Ok(self
            .turns
            .read()
            .by_session
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    fn turn_count(&self, session_id: &str) -> Result<u64> {
        Ok(self
            .turns
            .read()
            .by_session
            .get(session_id)
            .map(|v| v.len() as u64)
            .unwrap_or(0))
    }
}

// ── Channels ────────────────────────────────────────────────────────

impl ChannelStore for MemoryBackend {
    fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        self.channels
            .write()
            .insert(channel.channel_id.clone(), channel.clone());
        Ok(())
    }

    fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        Ok(self.channels.read().get(channel_id).cloned())
    }
}

// ── Schedules ───────────────────────────────────────────────────────

impl ScheduleStore for MemoryBackend {
    fn upsert_schedule(&self, schedule: &Schedule) -> Result<()> {
        self.schedules
            .write()
            .insert(schedule.schedule_id.clone(), schedule.clone());
        Ok(())
    }

    fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>> {
        Ok(self.schedules.read().get(schedule_id).cloned())
    }

    fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let mut all: Vec<Schedule> = self.schedules.read().values().cloned().collect();
        all.sort_by(|a, b| a.schedule_id.cmp(&b.schedule_id));
        Ok(all)
    }
}

// ── Executions ──────────────────────────────────────────────────────

impl ExecutionStore for MemoryBackend {
    fn submit_execution(
        &self,
        execution: &ScheduledExecution,
        delta: &ScheduleDelta,
        completed_audit: &AuditEntry,
        ignored_audit: &AuditEntry,
    ) -> Result<bool> {
        // Lock order: executions, schedules, audits.
        let mut log = self.executions.lock();

        if log.by_id.contains_key(&execution.execution_id) {
            self.audits.lock().push(ignored_audit.clone());
            return Ok(false);
        }

        let idx = log.rows.len();
        log.rows.push(execution.clone());
        log.by_id.insert(execution.execution_id, idx);

        {
            let mut schedules = self.schedules.write();
            if let Some(schedule) = schedules.get_mut(&execution.schedule_id) {
                schedule.last_execution_at = Some(delta.last_execution_at);
                schedule.next_execution_at = delta.next_execution_at;
                if let Some(status) = delta.schedule_status {
                    schedule.schedule_status = status;
                }
            }
        }

        self.audits.lock().push(completed_audit.clone());
        Ok(true)
    }

    fn get_execution(&self, execution_id: Uuid) -> Result<Option<ScheduledExecution>> {
        let log = self.executions.lock();
        Ok(log
            .by_id
            .get(&execution_id)
            .map(|&idx| log.rows[idx].clone()))
    }

    fn list_executions(&self, schedule_id: &str) -> Result<Vec<ScheduledExecution>> {
        Ok(self
            .executions
            .lock()
            .rows
            .iter()
            .filter(|e| e.schedule_id == schedule_id)
            .cloned()
            .collect())
    }
}

// ── Audit ───────────────────────────────────────────────────────────

impl AuditStore for MemoryBackend {
    fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.audits.lock().push(entry.clone());
        Ok(())
    }

    fn list_audit(&self) -> Result<Vec<AuditEntry>> {
        let mut all = self.audits.lock().clone();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    fn list_audit_for_agent(&self, agent_id: &str) -> Result<Vec<AuditEntry>> {
        Ok(self
            .list_audit()?
            .into_iter()
            .filter(|e| e.agent_id == agent_id)
            .collect())
    }
}

// ── Memory ──────────────────────────────────────────────────────────

impl MemoryStore for MemoryBackend {
    fn encode_memory(&self, item: &MemoryItem) -> Result<()> {
        self.memory
            .write()
            .insert(item.memory_item_id.clone(), item.clone());
        Ok(())
    }

    fn search_memory(&self, query: &MemoryQuery) -> Result<MemoryPage> {
        let matches: Vec<MemoryItem> = self
            .memory
            .read()
            .values()
            .filter(|item| rules::memory_matches(item, query))
            .cloned()
            .collect();
        rules::paginate_memory(matches, query)
    }

    fn forget_memory(&self, agent_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut memory = self.memory.write();
        let before = memory.len();
        memory.retain(|_, item| !(item.agent_id == agent_id && item.created_at < cutoff));
        Ok((before - memory.len()) as u64)
    }
}
