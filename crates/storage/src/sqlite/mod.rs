//! SQLite backend — one connection, per-call transactions.
//!
//! Enum fields are persisted as their canonical strings (guarded by the
//! schema's CHECK constraints), timestamps as RFC 3339 with millisecond
//! precision (which also sorts lexicographically in ORDER BY).

pub mod schema;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use pa_domain::agent::{AgentRecord, PermissionMode, QuotaPeriod};
use pa_domain::audit::{AuditEntry, PolicyDecision};
use pa_domain::memory::{
    MemoryItem, MemoryPage, MemoryQuery, MemoryScope, MemorySource, MemoryTier, Sensitivity,
};
use pa_domain::schedule::{
    ConcurrencyPolicy, ExecutionOutcome, RecurrencePattern, Schedule, ScheduleDelta,
    ScheduleStatus, ScheduleTrigger, ScheduledExecution, TriggerSource,
};
use pa_domain::session::{Channel, ChannelType, Session};
use pa_domain::turn::{ParticipantRole, Turn};
use pa_domain::{Error, Result};

use crate::ports::{
    AgentStore, AuditStore, ChannelStore, ExecutionStore, MemoryStore, NewTurn, ScheduleStore,
    SessionStore, TurnStore,
};
use crate::rules;

/// Durable storage backend over a single SQLite file.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| Error::entity("sqlite", format!("{}: {e}", db_path.display())))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::entity("sqlite", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| Error::entity("sqlite", e))?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Column codecs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn encode_ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn encode_opt_ts(t: &Option<DateTime<Utc>>) -> Option<String> {
    t.as_ref().map(encode_ts)
}

fn conversion<E>(e: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
}

fn decode_ts(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(conversion)
}

fn decode_opt_ts(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(decode_ts).transpose()
}

fn decode_enum<T>(raw: String, parse: fn(&str) -> Option<T>, what: &str) -> rusqlite::Result<T> {
    parse(&raw).ok_or_else(|| conversion(format!("bad {what}: {raw}")))
}

fn decode_uuid(raw: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&raw).map_err(conversion)
}

fn decode_json(raw: Option<String>) -> rusqlite::Result<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(&s).map_err(conversion))
        .transpose()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Row mappers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    Ok(AgentRecord {
        agent_id: row.get(0)?,
        permission_mode: decode_enum(row.get(1)?, PermissionMode::parse, "permission_mode")?,
        token_budget: row.get::<_, i64>(2)? as u64,
        quota_period: decode_enum(row.get(3)?, QuotaPeriod::parse, "quota_period")?,
        tokens_consumed: row.get::<_, i64>(4)? as u64,
        budget_reset_at: decode_opt_ts(row.get(5)?)?,
    })
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        session_id: row.get(0)?,
        conversation_id: row.get(1)?,
        token_capacity: row.get::<_, i64>(2)? as u64,
        tokens_used: row.get::<_, i64>(3)? as u64,
    })
}

fn row_to_turn(row: &Row<'_>) -> rusqlite::Result<Turn> {
    let blocks: String = row.get(7)?;
    Ok(Turn {
        turn_id: row.get(0)?,
        session_id: row.get(1)?,
        conversation_id: row.get(2)?,
        turn_index: row.get::<_, i64>(3)? as u64,
        participant_role: decode_enum(row.get(4)?, ParticipantRole::parse, "participant_role")?,
        message_id: row.get(5)?,
        message_content: row.get(6)?,
        content_blocks: serde_json::from_str(&blocks).map_err(conversion)?,
        model_finish_reason: row.get(8)?,
        model_usage_json: decode_json(row.get(9)?)?,
        created_at: decode_ts(row.get(10)?)?,
    })
}

fn row_to_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        channel_id: row.get(0)?,
        channel_type: decode_enum(row.get(1)?, ChannelType::parse, "channel_type")?,
        agent_id: row.get(2)?,
        active_session_id: row.get(3)?,
        active_conversation_id: row.get(4)?,
        created_at: decode_ts(row.get(5)?)?,
    })
}

fn row_to_schedule(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        schedule_id: row.get(0)?,
        owner_agent_id: row.get(1)?,
        recurrence_pattern: RecurrencePattern {
            label: row.get(2)?,
            cron_expression: row.get(3)?,
            interval_seconds: row.get(4)?,
        },
        trigger: decode_enum(row.get(5)?, ScheduleTrigger::parse, "trigger_tag")?,
        action_ref: row.get(6)?,
        schedule_status: decode_enum(row.get(7)?, ScheduleStatus::parse, "schedule_status")?,
        concurrency_policy: decode_enum(
            row.get(8)?,
            ConcurrencyPolicy::parse,
            "concurrency_policy",
        )?,
        allows_catch_up: row.get(9)?,
        auto_disable_after_run: row.get(10)?,
        catch_up_window_seconds: row.get(11)?,
        max_catch_up_runs_per_tick: row.get(12)?,
        last_execution_at: decode_opt_ts(row.get(13)?)?,
        next_execution_at: decode_opt_ts(row.get(14)?)?,
    })
}

fn row_to_execution(row: &Row<'_>) -> rusqlite::Result<ScheduledExecution> {
    Ok(ScheduledExecution {
        execution_id: decode_uuid(row.get(0)?)?,
        schedule_id: row.get(1)?,
        due_at: decode_ts(row.get(2)?)?,
        trigger_source: decode_enum(row.get(3)?, TriggerSource::parse, "trigger_source")?,
        outcome: decode_enum(row.get(4)?, ExecutionOutcome::parse, "outcome")?,
        started_at: decode_ts(row.get(5)?)?,
        ended_at: decode_opt_ts(row.get(6)?)?,
        skip_reason: row.get(7)?,
        created_at: decode_ts(row.get(8)?)?,
    })
}

fn row_to_audit(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        audit_entry_id: row.get(0)?,
        agent_id: row.get(1)?,
        session_id: row.get(2)?,
        decision: decode_enum(row.get(3)?, PolicyDecision::parse, "decision")?,
        reason: row.get(4)?,
        created_at: decode_ts(row.get(5)?)?,
    })
}

fn row_to_memory(row: &Row<'_>) -> rusqlite::Result<MemoryItem> {
    Ok(MemoryItem {
        memory_item_id: row.get(0)?,
        agent_id: row.get(1)?,
        tier: decode_enum(row.get(2)?, MemoryTier::parse, "tier")?,
        scope: decode_enum(row.get(3)?, MemoryScope::parse, "scope")?,
        source: decode_enum(row.get(4)?, MemorySource::parse, "source")?,
        content: row.get(5)?,
        metadata_json: decode_json(row.get(6)?)?,
        generated_by_turn_id: row.get(7)?,
        session_id: row.get(8)?,
        sensitivity: decode_enum(row.get(9)?, Sensitivity::parse, "sensitivity")?,
        created_at: decode_ts(row.get(10)?)?,
        updated_at: decode_ts(row.get(11)?)?,
    })
}

fn insert_audit(conn: &Connection, entry: &AuditEntry) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO audit_entries
            (audit_entry_id, agent_id, session_id, decision, reason, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            entry.audit_entry_id,
            entry.agent_id,
            entry.session_id,
            entry.decision.as_str(),
            entry.reason,
            encode_ts(&entry.created_at),
        ],
    )?;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Port implementations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl AgentStore for SqliteBackend {
    fn upsert_agent(&self, agent: &AgentRecord) -> Result<()> {
        self.conn
            .lock()
            .execute(
                r#"
                INSERT INTO agents
                    (agent_id, permission_mode, token_budget, quota_period,
                     tokens_consumed, budget_reset_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(agent_id) DO UPDATE SET
                    permission_mode = ?2,
                    token_budget = ?3,
                    quota_period = ?4,
                    tokens_consumed = ?5,
                    budget_reset_at = ?6
                "#,
                params![
                    agent.agent_id,
                    agent.permission_mode.as_str(),
                    agent.token_budget as i64,
                    agent.quota_period.as_str(),
                    agent.tokens_consumed as i64,
                    encode_opt_ts(&agent.budget_reset_at),
                ],
            )
            .map_err(|e| Error::entity("agent", e))?;
        Ok(())
    }

    fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>> {
        self.conn
            .lock()
            .query_row(
                "SELECT agent_id, permission_mode, token_budget, quota_period, \
                 tokens_consumed, budget_reset_at FROM agents WHERE agent_id = ?1",
                params![agent_id],
                row_to_agent,
            )
            .optional()
            .map_err(|e| Error::entity("agent", e))
    }

    fn consume_token_budget(
        &self,
        agent_id: &str,
        tokens: u64,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| Error::entity("agent", e))?;

        let mut agent = tx
            .query_row(
                "SELECT agent_id, permission_mode, token_budget, quota_period, \
                 tokens_consumed, budget_reset_at FROM agents WHERE agent_id = ?1",
                params![agent_id],
                row_to_agent,
            )
            .optional()
            .map_err(|e| Error::entity("agent", e))?
            .ok_or_else(|| Error::entity("agent", format!("not found: {agent_id}")))?;

        let remaining = rules::consume_budget(&mut agent, tokens, now)?;

        tx.execute(
            "UPDATE agents SET tokens_consumed = ?2, budget_reset_at = ?3 WHERE agent_id = ?1",
            params![
                agent.agent_id,
                agent.tokens_consumed as i64,
                encode_opt_ts(&agent.budget_reset_at),
            ],
        )
        .map_err(|e| Error::entity("agent", e))?;
        tx.commit().map_err(|e| Error::entity("agent", e))?;
        Ok(remaining)
    }
}

impl SessionStore for SqliteBackend {
    fn start_session(&self, session: &Session) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT OR IGNORE INTO sessions \
                 (session_id, conversation_id, token_capacity, tokens_used) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    session.session_id,
                    session.conversation_id,
                    session.token_capacity as i64,
                    session.tokens_used as i64,
                ],
            )
            .map_err(|e| Error::entity("session", e))?;
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.conn
            .lock()
            .query_row(
                "SELECT session_id, conversation_id, token_capacity, tokens_used \
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                row_to_session,
            )
            .optional()
            .map_err(|e| Error::entity("session", e))
    }

    fn update_context_window(&self, session_id: &str, delta: i64) -> Result<u64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| Error::entity("session", e))?;

        let mut session = tx
            .query_row(
                "SELECT session_id, conversation_id, token_capacity, tokens_used \
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                row_to_session,
            )
            .optional()
            .map_err(|e| Error::entity("session", e))?
            .ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_owned(),
            })?;

        let new_used = rules::apply_window_delta(&mut session, delta)?;

        tx.execute(
            "UPDATE sessions SET tokens_used = ?2 WHERE session_id = ?1",
            params![session.session_id, new_used as i64],
        )
        .map_err(|e| Error::entity("session", e))?;
        tx.commit().map_err(|e| Error::entity("session", e))?;
        Ok(new_used)
    }
}

impl TurnStore for SqliteBackend {
    fn append_turn(&self, turn: &NewTurn) -> Result<Option<u64>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| Error::entity("turn", e))?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM turns WHERE turn_id = ?1",
                params![turn.turn_id],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| Error::entity("turn", e))?
            .is_some();
        if exists {
            return Ok(None);
        }

        let turn_index: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM turns WHERE session_id = ?1",
                params![turn.session_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::entity("turn", e))?;

        let blocks = serde_json::to_string(&turn.content_blocks)?;
        let usage = turn
            .model_usage_json
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        tx.execute(
            r#"
            INSERT INTO turns
                (turn_id, session_id, conversation_id, turn_index, participant_role,
                 message_id, message_content, content_blocks, model_finish_reason,
                 model_usage_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                turn.turn_id,
                turn.session_id,
                turn.conversation_id,
                turn_index,
                turn.participant_role.as_str(),
                turn.message_id,
                turn.message_content,
                blocks,
                turn.model_finish_reason,
                usage,
                encode_ts(&turn.created_at),
            ],
        )
        .map_err(|e| Error::entity("turn", e))?;
        tx.commit().map_err(|e| Error::entity("turn", e))?;
        Ok(Some(turn_index as u64))
    }

    fn list_turns(&self, session_id: &str) -> Result<Vec<Turn>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT turn_id, session_id, conversation_id, turn_index, participant_role, \
                 message_id, message_content, content_blocks, model_finish_reason, \
                 model_usage_json, created_at \
                 FROM turns WHERE session_id = ?1 ORDER BY turn_index",
            )
            .map_err(|e| Error::entity("turn", e))?;
        let rows = stmt
            .query_map(params![session_id], row_to_turn)
            .map_err(|e| Error::entity("turn", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::entity("turn", e))
    }

    fn turn_count(&self, session_id: &str) -> Result<u64> {
        let count: i64 = self
            .conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM turns WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::entity("turn", e))?;
        Ok(count as u64)
    }
}

impl ChannelStore for SqliteBackend {
    fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        self.conn
            .lock()
            .execute(
                r#"
                INSERT INTO channels
                    (channel_id, channel_type, agent_id, active_session_id,
                     active_conversation_id, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(channel_id) DO UPDATE SET
                    channel_type = ?2,
                    agent_id = ?3,
                    active_session_id = ?4,
                    active_conversation_id = ?5
                "#,
                params![
                    channel.channel_id,
                    channel.channel_type.as_str(),
                    channel.agent_id,
                    channel.active_session_id,
                    channel.active_conversation_id,
                    encode_ts(&channel.created_at),
                ],
            )
            .map_err(|e| Error::entity("channel", e))?;
        Ok(())
    }

    fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        self.conn
            .lock()
            .query_row(
                "SELECT channel_id, channel_type, agent_id, active_session_id, \
                 active_conversation_id, created_at FROM channels WHERE channel_id = ?1",
                params![channel_id],
                row_to_channel,
            )
            .optional()
            .map_err(|e| Error::entity("channel", e))
    }
}

impl ScheduleStore for SqliteBackend {
    fn upsert_schedule(&self, schedule: &Schedule) -> Result<()> {
        self.conn
            .lock()
            .execute(
                r#"
                INSERT INTO schedules
                    (schedule_id, owner_agent_id, recurrence_label, cron_expression,
                     interval_seconds, trigger_tag, action_ref, schedule_status,
                     concurrency_policy, allows_catch_up, auto_disable_after_run,
                     catch_up_window_seconds, max_catch_up_runs_per_tick,
                     last_execution_at, next_execution_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                ON CONFLICT(schedule_id) DO UPDATE SET
                    owner_agent_id = ?2,
                    recurrence_label = ?3,
                    cron_expression = ?4,
                    interval_seconds = ?5,
                    trigger_tag = ?6,
                    action_ref = ?7,
                    schedule_status = ?8,
                    concurrency_policy = ?9,
                    allows_catch_up = ?10,
                    auto_disable_after_run = ?11,
                    catch_up_window_seconds = ?12,
                    max_catch_up_runs_per_tick = ?13,
                    last_execution_at = ?14,
                    next_execution_at = ?15
                "#,
                params![
                    schedule.schedule_id,
                    schedule.owner_agent_id,
                    schedule.recurrence_pattern.label,
                    schedule.recurrence_pattern.cron_expression,
                    schedule.recurrence_pattern.interval_seconds,
                    schedule.trigger.as_str(),
                    schedule.action_ref,
                    schedule.schedule_status.as_str(),
                    schedule.concurrency_policy.as_str(),
                    schedule.allows_catch_up,
                    schedule.auto_disable_after_run,
                    schedule.catch_up_window_seconds,
                    schedule.max_catch_up_runs_per_tick,
                    encode_opt_ts(&schedule.last_execution_at),
                    encode_opt_ts(&schedule.next_execution_at),
                ],
            )
            .map_err(|e| Error::entity("schedule", e))?;
        Ok(())
    }

    fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>> {
        self.conn
            .lock()
            .query_row(
                "SELECT schedule_id, owner_agent_id, recurrence_label, cron_expression, \
                 interval_seconds, trigger_tag, action_ref, schedule_status, \
                 concurrency_policy, allows_catch_up, auto_disable_after_run, \
                 catch_up_window_seconds, max_catch_up_runs_per_tick, \
                 last_execution_at, next_execution_at \
                 FROM schedules WHERE schedule_id = ?1",
                params![schedule_id],
                row_to_schedule,
            )
            .optional()
            .map_err(|e| Error::entity("schedule", e))
    }

    fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT schedule_id, owner_agent_id, recurrence_label, cron_expression, \
                 interval_seconds, trigger_tag, action_ref, schedule_status, \
                 concurrency_policy, allows_catch_up, auto_disable_after_run, \
                 catch_up_window_seconds, max_catch_up_runs_per_tick, \
                 last_execution_at, next_execution_at \
                 FROM schedules ORDER BY schedule_id",
            )
            .map_err(|e| Error::entity("schedule", e))?;
        let rows = stmt
            .query_map([], row_to_schedule)
            .map_err(|e| Error::entity("schedule", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::entity("schedule", e))
    }
}

impl ExecutionStore for SqliteBackend {
    fn submit_execution(
        &self,
        execution: &ScheduledExecution,
        delta: &ScheduleDelta,
        completed_audit: &AuditEntry,
        ignored_audit: &AuditEntry,
    ) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::entity("scheduler_command", e))?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM scheduled_executions WHERE execution_id = ?1",
                params![execution.execution_id.to_string()],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| Error::entity("scheduler_command", e))?
            .is_some();

        if exists {
            insert_audit(&tx, ignored_audit).map_err(|e| Error::entity("scheduler_command", e))?;
            tx.commit().map_err(|e| Error::entity("scheduler_command", e))?;
            return Ok(false);
        }

        tx.execute(
            r#"
            INSERT INTO scheduled_executions
                (execution_id, schedule_id, due_at, trigger_source, outcome,
                 started_at, ended_at, skip_reason, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                execution.execution_id.to_string(),
                execution.schedule_id,
                encode_ts(&execution.due_at),
                execution.trigger_source.as_str(),
                execution.outcome.as_str(),
                encode_ts(&execution.started_at),
                encode_opt_ts(&execution.ended_at),
                execution.skip_reason,
                encode_ts(&execution.created_at),
            ],
        )
        .map_err(|e| Error::entity("scheduler_command", e))?;

        match delta.schedule_status {
            Some(status) => tx.execute(
                "UPDATE schedules SET last_execution_at = ?2, next_execution_at = ?3, \
                 schedule_status = ?4 WHERE schedule_id = ?1",
                params![
                    execution.schedule_id,
                    encode_ts(&delta.last_execution_at),
                    encode_opt_ts(&delta.next_execution_at),
                    status.as_str(),
                ],
            ),
            None => tx.execute(
                "UPDATE schedules SET last_execution_at = ?2, next_execution_at = ?3 \
                 WHERE schedule_id = ?1",
                params![
                    execution.schedule_id,
                    encode_ts(&delta.last_execution_at),
                    encode_opt_ts(&delta.next_execution_at),
                ],
            ),
        }
        .map_err(|e| Error::entity("scheduler_command", e))?;

        insert_audit(&tx, completed_audit).map_err(|e| Error::entity("scheduler_command", e))?;
        tx.commit().map_err(|e| Error::entity("scheduler_command", e))?;
        Ok(true)
    }

    fn get_execution(&self, execution_id: Uuid) -> Result<Option<ScheduledExecution>> {
        self.conn
            .lock()
            .query_row(
                "SELECT execution_id, schedule_id, due_at, trigger_source, outcome, \
                 started_at, ended_at, skip_reason, created_at \
                 FROM scheduled_executions WHERE execution_id = ?1",
                params![execution_id.to_string()],
                row_to_execution,
            )
            .optional()
            .map_err(|e| Error::entity("scheduled_execution", e))
    }

    fn list_executions(&self, schedule_id: &str) -> Result<Vec<ScheduledExecution>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT execution_id, schedule_id, due_at, trigger_source, outcome, \
                 started_at, ended_at, skip_reason, created_at \
                 FROM scheduled_executions WHERE schedule_id = ?1 ORDER BY created_at, rowid",
            )
            .map_err(|e| Error::entity("scheduled_execution", e))?;
        let rows = stmt
            .query_map(params![schedule_id], row_to_execution)
            .map_err(|e| Error::entity("scheduled_execution", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::entity("scheduled_execution", e))
    }
}

impl AuditStore for SqliteBackend {
    fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        insert_audit(&self.conn.lock(), entry).map_err(|e| Error::entity("audit", e))
    }

    fn list_audit(&self) -> Result<Vec<AuditEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT audit_entry_id, agent_id, session_id, decision, reason, created_at \
                 FROM audit_entries ORDER BY created_at, rowid",
            )
            .map_err(|e| Error::entity("audit", e))?;
        let rows = stmt
            .query_map([], row_to_audit)
            .map_err(|e| Error::entity("audit", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::entity("audit", e))
    }

    fn list_audit_for_agent(&self, agent_id: &str) -> Result<Vec<AuditEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT audit_entry_id, agent_id, session_id, decision, reason, created_at \
                 FROM audit_entries WHERE agent_id = ?1 ORDER BY created_at, rowid",
            )
            .map_err(|e| Error::entity("audit", e))?;
        let rows = stmt
            .query_map(params![agent_id], row_to_audit)
            .map_err(|e| Error::entity("audit", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::entity("audit", e))
    }
}

impl MemoryStore for SqliteBackend {
    fn encode_memory(&self, item: &MemoryItem) -> Result<()> {
        let metadata = item
            .metadata_json
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn
            .lock()
            .execute(
                r#"
                INSERT INTO memory_items
                    (memory_item_id, agent_id, tier, scope, source, content,
                     metadata_json, generated_by_turn_id, session_id, sensitivity,
                     created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(memory_item_id) DO UPDATE SET
                    tier = ?3,
                    scope = ?4,
                    source = ?5,
                    content = ?6,
                    metadata_json = ?7,
                    sensitivity = ?10,
                    updated_at = ?12
                "#,
                params![
                    item.memory_item_id,
                    item.agent_id,
                    item.tier.as_str(),
                    item.scope.as_str(),
                    item.source.as_str(),
                    item.content,
                    metadata,
                    item.generated_by_turn_id,
                    item.session_id,
                    item.sensitivity.as_str(),
                    encode_ts(&item.created_at),
                    encode_ts(&item.updated_at),
                ],
            )
            .map_err(|e| Error::entity("memory", e))?;
        Ok(())
    }

    fn search_memory(&self, query: &MemoryQuery) -> Result<MemoryPage> {
        let mut sql = String::from(
            "SELECT memory_item_id, agent_id, tier, scope, source, content, \
             metadata_json, generated_by_turn_id, session_id, sensitivity, \
             created_at, updated_at FROM memory_items WHERE 1 = 1",
        );
        let mut args: Vec<String> = Vec::new();

        if let Some(agent_id) = &query.agent_id {
            args.push(agent_id.clone());
            sql.push_str(&format!(" AND agent_id = ?{}", args.len()));
        }
        if let Some(tier) = query.tier {
            args.push(tier.as_str().to_owned());
            sql.push_str(&format!(" AND tier = ?{}", args.len()));
        }
        if let Some(scope) = query.scope {
            args.push(scope.as_str().to_owned());
            sql.push_str(&format!(" AND scope = ?{}", args.len()));
        }
        if let Some(text) = &query.text {
            args.push(format!("%{}%", text.to_lowercase()));
            sql.push_str(&format!(" AND lower(content) LIKE ?{}", args.len()));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::entity("memory", e))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), row_to_memory)
            .map_err(|e| Error::entity("memory", e))?;
        let matches = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::entity("memory", e))?;
        rules::paginate_memory(matches, query)
    }

    fn forget_memory(&self, agent_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = self
            .conn
            .lock()
            .execute(
                "DELETE FROM memory_items WHERE agent_id = ?1 AND created_at < ?2",
                params![agent_id, encode_ts(&cutoff)],
            )
            .map_err(|e| Error::entity("memory", e))?;
        Ok(deleted as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn schema_initializes_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sqlite");
        {
            let store = SqliteBackend::open(&path).unwrap();
            store
                .start_session(&Session::new("s1", "c1", 100))
                .unwrap();
        }
        let store = SqliteBackend::open(&path).unwrap();
        assert!(store.get_session("s1").unwrap().is_some());
    }

    #[test]
    fn timestamps_keep_millisecond_precision() {
        let store = SqliteBackend::open_in_memory().unwrap();
        let created = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap()
            + chrono::Duration::milliseconds(123);
        let entry = AuditEntry {
            audit_entry_id: "a1".into(),
            agent_id: "main".into(),
            session_id: None,
            decision: PolicyDecision::Allow,
            reason: "mvp_default_allow".into(),
            created_at: created,
        };
        store.append_audit(&entry).unwrap();
        let listed = store.list_audit().unwrap();
        assert_eq!(listed[0].created_at, created);
    }

    #[test]
    fn bad_tier_value_violates_check_constraint() {
        let store = SqliteBackend::open_in_memory().unwrap();
        let result = store.conn.lock().execute(
            "INSERT INTO memory_items \
             (memory_item_id, agent_id, tier, scope, source, content, sensitivity, \
              created_at, updated_at) \
             VALUES ('m1', 'a1', 'Imaginary', 'Global', 'User', 'x', 'Public', \
              '2024-06-15T10:00:00.000Z', '2024-06-15T10:00:00.000Z')",
            [],
        );
        assert!(result.is_err());
    }
}
