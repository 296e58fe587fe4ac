//! Governance — policy evaluation, per-tool daily quotas, the append-only
//! audit log, and sandbox enforcement.
//!
//! The policy engine is deliberately minimal: every action is allowed with
//! reason `mvp_default_allow` until real policies land. Quota tracking is
//! an in-memory, lock-protected map that normalises its window when the
//! UTC day rolls over.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use pa_domain::audit::{AuditEntry, PolicyDecision};
use pa_domain::{Error, Result};
use pa_storage::AuditStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What is being attempted, by whom.
#[derive(Clone, Debug)]
pub struct PolicyInput<'a> {
    pub agent_id: &'a str,
    pub session_id: Option<&'a str>,
    pub action: &'a str,
}

/// The verdict handed back to the caller.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyOutcome {
    pub decision: PolicyDecision,
    pub policy_id: Option<String>,
    pub reason: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool quota state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const DEFAULT_TOOL_INVOCATIONS_PER_DAY: u32 = 200;

struct ToolQuota {
    max_per_day: u32,
    used_today: u32,
    reset_at: DateTime<Utc>,
}

/// Midnight UTC of the day after `now`.
fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let start_of_day = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();
    start_of_day + chrono::Duration::days(1)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Governance
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Governance {
    audits: Arc<dyn AuditStore>,
    quotas: RwLock<HashMap<(String, String), ToolQuota>>,
    default_max_per_day: u32,
}

impl Governance {
    pub fn new(audits: Arc<dyn AuditStore>) -> Self {
        Self {
            audits,
            quotas: RwLock::new(HashMap::new()),
            default_max_per_day: DEFAULT_TOOL_INVOCATIONS_PER_DAY,
        }
    }

    /// Override the per-day ceiling for one `(agent, tool)` pair.
    pub fn set_tool_limit(&self, agent_id: &str, tool_name: &str, max_per_day: u32, now: DateTime<Utc>) {
        let mut quotas = self.quotas.write();
        let entry = quotas
            .entry((agent_id.to_owned(), tool_name.to_owned()))
            .or_insert_with(|| ToolQuota {
                max_per_day,
                used_today: 0,
                reset_at: next_utc_midnight(now),
            });
        entry.max_per_day = max_per_day;
    }

    /// Evaluate whether `input.action` may proceed.
    pub fn evaluate_policy(&self, input: &PolicyInput<'_>) -> PolicyOutcome {
        tracing::debug!(
            agent_id = %input.agent_id,
            action = %input.action,
            "policy evaluated"
        );
        PolicyOutcome {
            decision: PolicyDecision::Allow,
            policy_id: None,
            reason: "mvp_default_allow".to_owned(),
        }
    }

    /// Count one invocation of `tool_name` against the agent's daily
    /// quota; returns the remaining allowance for today.
    pub fn check_tool_quota(&self, agent_id: &str, tool_name: &str, now: DateTime<Utc>) -> Result<u32> {
        let mut quotas = self.quotas.write();
        let entry = quotas
            .entry((agent_id.to_owned(), tool_name.to_owned()))
            .or_insert_with(|| ToolQuota {
                max_per_day: self.default_max_per_day,
                used_today: 0,
                reset_at: next_utc_midnight(now),
            });

        if now >= entry.reset_at {
            entry.used_today = 0;
            entry.reset_at = next_utc_midnight(now);
        }

        if entry.used_today >= entry.max_per_day {
            return Err(Error::ToolQuotaExceeded {
                agent_id: agent_id.to_owned(),
                tool_name: tool_name.to_owned(),
                remaining_invocations: 0,
            });
        }

        entry.used_today += 1;
        Ok(entry.max_per_day - entry.used_today)
    }

    /// Append a durable audit record.
    pub fn write_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.audits.append_audit(entry)
    }

    /// Run `effect` under sandbox supervision. A `SandboxViolation`
    /// terminates the effect and is surfaced as the typed error; every
    /// other outcome passes through untouched.
    pub fn enforce_sandbox<T>(
        &self,
        agent_id: &str,
        effect: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        match effect() {
            Err(Error::SandboxViolation { reason, .. }) => {
                tracing::warn!(agent_id = %agent_id, reason = %reason, "sandbox violation");
                Err(Error::SandboxViolation {
                    agent_id: agent_id.to_owned(),
                    reason,
                })
            }
            other => other,
        }
    }
}
