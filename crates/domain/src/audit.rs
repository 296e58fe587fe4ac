//! Append-only audit entries and policy decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny,
    RequireApproval,
}

impl PolicyDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
            Self::RequireApproval => "RequireApproval",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Allow" => Some(Self::Allow),
            "Deny" => Some(Self::Deny),
            "RequireApproval" => Some(Self::RequireApproval),
            _ => None,
        }
    }
}

/// One append-only governance record, ordered by `created_at`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub audit_entry_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub decision: PolicyDecision,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
