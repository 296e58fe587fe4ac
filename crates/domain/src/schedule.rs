//! Schedules, execution tickets, and persisted execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Schedule model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a schedule recurs. A schedule only produces due windows when at
/// least one of `cron_expression` / `interval_seconds` is set; cron
/// expressions are stored for display but never evaluated — recurrence
/// arithmetic is fixed-point plus interval only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecurrencePattern {
    pub label: String,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub interval_seconds: Option<i64>,
}

impl RecurrencePattern {
    /// A pattern with neither field can never fire.
    pub fn is_recurrent(&self) -> bool {
        self.cron_expression.is_some() || self.interval_seconds.is_some()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScheduleTrigger {
    #[serde(rename = "CronTrigger")]
    Cron,
    #[serde(rename = "IntervalTrigger")]
    Interval,
    #[serde(rename = "EventTrigger")]
    Event,
}

impl ScheduleTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cron => "CronTrigger",
            Self::Interval => "IntervalTrigger",
            Self::Event => "EventTrigger",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CronTrigger" => Some(Self::Cron),
            "IntervalTrigger" => Some(Self::Interval),
            "EventTrigger" => Some(Self::Event),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScheduleStatus {
    Active,
    Paused,
    Expired,
    Disabled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Paused => "Paused",
            Self::Expired => "Expired",
            Self::Disabled => "Disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(Self::Active),
            "Paused" => Some(Self::Paused),
            "Expired" => Some(Self::Expired),
            "Disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    Allow,
    Forbid,
    Replace,
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self::Allow
    }
}

impl ConcurrencyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Forbid => "Forbid",
            Self::Replace => "Replace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Allow" => Some(Self::Allow),
            "Forbid" => Some(Self::Forbid),
            "Replace" => Some(Self::Replace),
            _ => None,
        }
    }
}

/// A recurring trigger bound to an `action_ref`, owned by an agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub schedule_id: String,
    pub owner_agent_id: String,
    pub recurrence_pattern: RecurrencePattern,
    pub trigger: ScheduleTrigger,
    /// Action URI, e.g. `action:log`.
    pub action_ref: String,
    pub schedule_status: ScheduleStatus,
    #[serde(default)]
    pub concurrency_policy: ConcurrencyPolicy,
    #[serde(default)]
    pub allows_catch_up: bool,
    #[serde(default)]
    pub auto_disable_after_run: bool,
    #[serde(default)]
    pub catch_up_window_seconds: i64,
    #[serde(default)]
    pub max_catch_up_runs_per_tick: i64,
    #[serde(default)]
    pub last_execution_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_execution_at: Option<DateTime<Utc>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What woke the schedule up.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TriggerSource {
    CronTick,
    IntervalTick,
    Event,
    Manual,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CronTick => "CronTick",
            Self::IntervalTick => "IntervalTick",
            Self::Event => "Event",
            Self::Manual => "Manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CronTick" => Some(Self::CronTick),
            "IntervalTick" => Some(Self::IntervalTick),
            "Event" => Some(Self::Event),
            "Manual" => Some(Self::Manual),
            _ => None,
        }
    }

    /// The tick source implied by a schedule's trigger kind.
    pub fn from_trigger(trigger: ScheduleTrigger) -> Self {
        match trigger {
            ScheduleTrigger::Cron => Self::CronTick,
            ScheduleTrigger::Interval => Self::IntervalTick,
            ScheduleTrigger::Event => Self::Event,
        }
    }
}

/// Terminal result of one scheduled execution.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionOutcome {
    #[serde(rename = "ExecutionSucceeded")]
    Succeeded,
    #[serde(rename = "ExecutionFailed")]
    Failed,
    #[serde(rename = "ExecutionSkipped")]
    Skipped,
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "ExecutionSucceeded",
            Self::Failed => "ExecutionFailed",
            Self::Skipped => "ExecutionSkipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ExecutionSucceeded" => Some(Self::Succeeded),
            "ExecutionFailed" => Some(Self::Failed),
            "ExecutionSkipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// In-memory handle for a single due window, identified by a unique
/// `execution_id` which doubles as the command-lane idempotency key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionTicket {
    pub execution_id: Uuid,
    pub schedule_id: String,
    pub owner_agent_id: String,
    pub due_at: DateTime<Utc>,
    pub trigger_source: TriggerSource,
    pub started_at: DateTime<Utc>,
    pub action_ref: String,
}

/// Persisted record of one execution, keyed by `execution_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledExecution {
    pub execution_id: Uuid,
    pub schedule_id: String,
    pub due_at: DateTime<Utc>,
    pub trigger_source: TriggerSource,
    pub outcome: ExecutionOutcome,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub skip_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The schedule mutation a completed ticket folds into, applied by the
/// command lane inside its transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleDelta {
    pub last_execution_at: DateTime<Utc>,
    /// Resolved new value; `None` clears the field.
    pub next_execution_at: Option<DateTime<Utc>>,
    pub schedule_status: Option<ScheduleStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_source_mapping() {
        assert_eq!(
            TriggerSource::from_trigger(ScheduleTrigger::Cron),
            TriggerSource::CronTick
        );
        assert_eq!(
            TriggerSource::from_trigger(ScheduleTrigger::Interval),
            TriggerSource::IntervalTick
        );
        assert_eq!(
            TriggerSource::from_trigger(ScheduleTrigger::Event),
            TriggerSource::Event
        );
    }

    #[test]
    fn outcome_persisted_form_round_trips() {
        for o in [
            ExecutionOutcome::Succeeded,
            ExecutionOutcome::Failed,
            ExecutionOutcome::Skipped,
        ] {
            assert_eq!(ExecutionOutcome::parse(o.as_str()), Some(o));
        }
        assert_eq!(
            serde_json::to_value(ExecutionOutcome::Succeeded).unwrap(),
            "ExecutionSucceeded"
        );
    }

    #[test]
    fn pattern_with_no_fields_is_not_recurrent() {
        let p = RecurrencePattern {
            label: "never".into(),
            cron_expression: None,
            interval_seconds: None,
        };
        assert!(!p.is_recurrent());
    }
}
