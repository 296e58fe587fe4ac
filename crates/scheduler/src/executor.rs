//! Action executor — resolves a ticket's `action:` ref under governance.
//!
//! The executor never errors: policy denials become `Skipped` (with the
//! denial recorded in the audit log), every other failure is caught and
//! converted to `Failed`.

use std::sync::Arc;

use pa_domain::audit::{AuditEntry, PolicyDecision};
use pa_domain::clock::{Clock, IdGenerator};
use pa_domain::schedule::{ExecutionOutcome, ExecutionTicket};
use pa_domain::Result;
use pa_governance::{Governance, PolicyInput};

/// What one ticket produced.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    pub skip_reason: Option<String>,
}

impl ExecutionResult {
    fn succeeded() -> Self {
        Self {
            outcome: ExecutionOutcome::Succeeded,
            skip_reason: None,
        }
    }

    fn skipped(reason: String) -> Self {
        Self {
            outcome: ExecutionOutcome::Skipped,
            skip_reason: Some(reason),
        }
    }
}

pub struct ActionExecutor {
    governance: Arc<Governance>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    /// Unknown `action:` refs are skipped instead of succeeding.
    strict_unknown_actions: bool,
}

impl ActionExecutor {
    pub fn new(
        governance: Arc<Governance>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        strict_unknown_actions: bool,
    ) -> Self {
        Self {
            governance,
            clock,
            ids,
            strict_unknown_actions,
        }
    }

    pub fn execute(&self, ticket: &ExecutionTicket) -> ExecutionResult {
        let verdict = self.governance.evaluate_policy(&PolicyInput {
            agent_id: &ticket.owner_agent_id,
            session_id: None,
            action: "ExecuteSchedule",
        });

        if verdict.decision != PolicyDecision::Allow {
            let reason = format!("schedule execution denied: {}", verdict.reason);
            self.audit_denial(ticket, verdict.decision, &reason);
            tracing::info!(
                schedule_id = %ticket.schedule_id,
                decision = verdict.decision.as_str(),
                "schedule execution skipped by policy"
            );
            return ExecutionResult::skipped(reason);
        }

        let dispatched = self
            .governance
            .enforce_sandbox(&ticket.owner_agent_id, || self.dispatch_action(ticket));

        match dispatched {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    schedule_id = %ticket.schedule_id,
                    action_ref = %ticket.action_ref,
                    error = %e,
                    "schedule action failed"
                );
                ExecutionResult {
                    outcome: ExecutionOutcome::Failed,
                    skip_reason: None,
                }
            }
        }
    }

    fn dispatch_action(&self, ticket: &ExecutionTicket) -> Result<ExecutionResult> {
        match ticket.action_ref.as_str() {
            "action:log" => {
                tracing::info!(
                    schedule_id = %ticket.schedule_id,
                    due_at = %ticket.due_at,
                    "scheduled log action fired"
                );
                Ok(ExecutionResult::succeeded())
            }
            "action:health_check" => {
                tracing::debug!(schedule_id = %ticket.schedule_id, "health check action");
                Ok(ExecutionResult::succeeded())
            }
            unknown => {
                if self.strict_unknown_actions {
                    Ok(ExecutionResult::skipped(format!(
                        "unknown action ref: {unknown}"
                    )))
                } else {
                    tracing::warn!(
                        action_ref = %unknown,
                        "unknown action ref, treating as succeeded"
                    );
                    Ok(ExecutionResult::succeeded())
                }
            }
        }
    }

    fn audit_denial(&self, ticket: &ExecutionTicket, decision: PolicyDecision, reason: &str) {
        let entry = AuditEntry {
            audit_entry_id: self.ids.next_id().to_string(),
            agent_id: ticket.owner_agent_id.clone(),
            session_id: None,
            decision,
            reason: reason.to_owned(),
            created_at: self.clock.now(),
        };
        if let Err(e) = self.governance.write_audit(&entry) {
            tracing::warn!(error = %e, "failed to audit policy denial");
        }
    }
}
