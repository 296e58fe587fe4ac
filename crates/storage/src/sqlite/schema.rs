//! SQLite schema — created idempotently at open, versioned through
//! `PRAGMA user_version`.

use rusqlite::Connection;

use pa_domain::{Error, Result};

/// Bump when table definitions change.
pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| Error::entity("schema", e))?;

    if current != 0 && current != SCHEMA_VERSION {
        return Err(Error::entity(
            "schema",
            format!("database schema version {current} is not {SCHEMA_VERSION}"),
        ));
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            agent_id TEXT PRIMARY KEY,
            permission_mode TEXT NOT NULL DEFAULT 'Standard',
            token_budget INTEGER NOT NULL,
            quota_period TEXT NOT NULL DEFAULT 'Daily',
            tokens_consumed INTEGER NOT NULL DEFAULT 0,
            budget_reset_at TEXT
        );

        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            token_capacity INTEGER NOT NULL,
            tokens_used INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS turns (
            turn_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            turn_index INTEGER NOT NULL,
            participant_role TEXT NOT NULL,
            message_id TEXT NOT NULL,
            message_content TEXT NOT NULL,
            content_blocks TEXT NOT NULL DEFAULT '[]',
            model_finish_reason TEXT,
            model_usage_json TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (session_id, turn_index)
        );
        CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, turn_index);

        CREATE TABLE IF NOT EXISTS channels (
            channel_id TEXT PRIMARY KEY,
            channel_type TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            active_session_id TEXT NOT NULL,
            active_conversation_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS schedules (
            schedule_id TEXT PRIMARY KEY,
            owner_agent_id TEXT NOT NULL,
            recurrence_label TEXT NOT NULL,
            cron_expression TEXT,
            interval_seconds INTEGER,
            trigger_tag TEXT NOT NULL,
            action_ref TEXT NOT NULL,
            schedule_status TEXT NOT NULL,
            concurrency_policy TEXT NOT NULL DEFAULT 'Allow',
            allows_catch_up INTEGER NOT NULL DEFAULT 0,
            auto_disable_after_run INTEGER NOT NULL DEFAULT 0,
            catch_up_window_seconds INTEGER NOT NULL DEFAULT 0,
            max_catch_up_runs_per_tick INTEGER NOT NULL DEFAULT 0,
            last_execution_at TEXT,
            next_execution_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_schedules_due
            ON schedules(schedule_status, next_execution_at);

        CREATE TABLE IF NOT EXISTS scheduled_executions (
            execution_id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            due_at TEXT NOT NULL,
            trigger_source TEXT NOT NULL,
            outcome TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            skip_reason TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_executions_schedule
            ON scheduled_executions(schedule_id, created_at);

        CREATE TABLE IF NOT EXISTS audit_entries (
            audit_entry_id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            session_id TEXT,
            decision TEXT NOT NULL,
            reason TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_entries(created_at);

        CREATE TABLE IF NOT EXISTS memory_items (
            memory_item_id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            tier TEXT NOT NULL
                CHECK (tier IN ('Working', 'Episodic', 'Semantic', 'Procedural')),
            scope TEXT NOT NULL
                CHECK (scope IN ('Session', 'Project', 'Global')),
            source TEXT NOT NULL
                CHECK (source IN ('User', 'System', 'Agent')),
            content TEXT NOT NULL,
            metadata_json TEXT,
            generated_by_turn_id TEXT,
            session_id TEXT,
            sensitivity TEXT NOT NULL
                CHECK (sensitivity IN ('Public', 'Internal', 'Confidential', 'Restricted')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memory_agent_created
            ON memory_items(agent_id, created_at);
        "#,
    )
    .map_err(|e| Error::entity("schema", e))?;

    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])
        .map_err(|e| Error::entity("schema", e))?;

    Ok(())
}
