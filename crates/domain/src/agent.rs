//! Agent records — budget and permission state per agent.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

/// How aggressively governance gates this agent's actions.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PermissionMode {
    Permissive,
    Standard,
    Restrictive,
}

impl Default for PermissionMode {
    fn default() -> Self {
        Self::Standard
    }
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permissive => "Permissive",
            Self::Standard => "Standard",
            Self::Restrictive => "Restrictive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Permissive" => Some(Self::Permissive),
            "Standard" => Some(Self::Standard),
            "Restrictive" => Some(Self::Restrictive),
            _ => None,
        }
    }
}

/// Rotation period for the agent's token budget window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    Daily,
    Monthly,
    Yearly,
    Lifetime,
}

impl Default for QuotaPeriod {
    fn default() -> Self {
        Self::Daily
    }
}

impl QuotaPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Monthly => "Monthly",
            Self::Yearly => "Yearly",
            Self::Lifetime => "Lifetime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Daily" => Some(Self::Daily),
            "Monthly" => Some(Self::Monthly),
            "Yearly" => Some(Self::Yearly),
            "Lifetime" => Some(Self::Lifetime),
            _ => None,
        }
    }

    /// The next budget reset instant after `from`. `Lifetime` never resets.
    pub fn next_reset(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Daily => Some(from + chrono::Duration::days(1)),
            Self::Monthly => from.checked_add_months(Months::new(1)),
            Self::Yearly => from.checked_add_months(Months::new(12)),
            Self::Lifetime => None,
        }
    }
}

/// Persisted agent state.
///
/// `tokens_consumed` stays within `[0, token_budget]` while the budget
/// window is open; an expired `budget_reset_at` makes the next consume
/// call reset the counter and open a fresh window.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub agent_id: String,
    #[serde(default)]
    pub permission_mode: PermissionMode,
    pub token_budget: u64,
    #[serde(default)]
    pub quota_period: QuotaPeriod,
    #[serde(default)]
    pub tokens_consumed: u64,
    #[serde(default)]
    pub budget_reset_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    pub fn new(agent_id: impl Into<String>, token_budget: u64, quota_period: QuotaPeriod) -> Self {
        Self {
            agent_id: agent_id.into(),
            permission_mode: PermissionMode::default(),
            token_budget,
            quota_period,
            tokens_consumed: 0,
            budget_reset_at: None,
        }
    }
}
