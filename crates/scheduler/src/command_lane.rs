//! Durable, idempotent command lane keyed by `execution_id`.
//!
//! Repeated submissions of the same execution are accepted but ignored:
//! exactly one submission persists the execution row and applies the
//! schedule delta, every submission leaves an audit entry, and all
//! writes of one call share a single storage transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use pa_domain::audit::{AuditEntry, PolicyDecision};
use pa_domain::clock::{Clock, IdGenerator};
use pa_domain::schedule::{
    ExecutionOutcome, ExecutionTicket, ScheduleDelta, ScheduledExecution,
};
use pa_domain::Result;
use pa_storage::ExecutionStore;

pub const REASON_COMPLETED: &str = "scheduler_command_completed";
pub const REASON_IGNORED: &str = "scheduler_command_ignored";

/// One completed ticket on its way into storage.
#[derive(Clone, Debug)]
pub struct CommandPayload {
    pub ticket: ExecutionTicket,
    pub outcome: ExecutionOutcome,
    pub ended_at: DateTime<Utc>,
    pub skip_reason: Option<String>,
    pub delta: ScheduleDelta,
}

#[derive(Clone, Copy, Debug)]
pub struct CommandReceipt {
    pub accepted: bool,
}

pub struct CommandLane {
    store: Arc<dyn ExecutionStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl CommandLane {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { store, clock, ids }
    }

    /// Submit a completed execution. Always `{accepted: true}` unless the
    /// storage transaction itself fails, in which case no audit entry is
    /// written either.
    pub fn execute(&self, payload: &CommandPayload) -> Result<CommandReceipt> {
        let now = self.clock.now();
        let ticket = &payload.ticket;

        let execution = ScheduledExecution {
            execution_id: ticket.execution_id,
            schedule_id: ticket.schedule_id.clone(),
            due_at: ticket.due_at,
            trigger_source: ticket.trigger_source,
            outcome: payload.outcome,
            started_at: ticket.started_at,
            ended_at: Some(payload.ended_at),
            skip_reason: payload.skip_reason.clone(),
            created_at: now,
        };

        let audit = |reason: &str| AuditEntry {
            audit_entry_id: self.ids.next_id().to_string(),
            agent_id: ticket.owner_agent_id.clone(),
            session_id: None,
            decision: PolicyDecision::Allow,
            reason: reason.to_owned(),
            created_at: now,
        };

        let inserted = self.store.submit_execution(
            &execution,
            &payload.delta,
            &audit(REASON_COMPLETED),
            &audit(REASON_IGNORED),
        )?;

        if !inserted {
            tracing::debug!(
                execution_id = %ticket.execution_id,
                schedule_id = %ticket.schedule_id,
                "duplicate command submission ignored"
            );
        }

        Ok(CommandReceipt { accepted: true })
    }
}
