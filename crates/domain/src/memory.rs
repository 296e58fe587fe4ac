//! Memory items — tiered long-term storage per agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classification enums
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Retention and retrieval class.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemoryTier {
    Working,
    Episodic,
    Semantic,
    Procedural,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemoryScope {
    Session,
    Project,
    Global,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemorySource {
    User,
    System,
    Agent,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Sensitivity {
    Public,
    Internal,
    Confidential,
    Restricted,
}

macro_rules! str_enum {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self { $(Self::$variant => $name),+ }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s { $($name => Some(Self::$variant),)+ _ => None }
            }
        }
    };
}

str_enum!(MemoryTier { Working => "Working", Episodic => "Episodic", Semantic => "Semantic", Procedural => "Procedural" });
str_enum!(MemoryScope { Session => "Session", Project => "Project", Global => "Global" });
str_enum!(MemorySource { User => "User", System => "System", Agent => "Agent" });
str_enum!(Sensitivity { Public => "Public", Internal => "Internal", Confidential => "Confidential", Restricted => "Restricted" });

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Item + queries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    pub memory_item_id: String,
    pub agent_id: String,
    pub tier: MemoryTier,
    pub scope: MemoryScope,
    pub source: MemorySource,
    pub content: String,
    #[serde(default)]
    pub metadata_json: Option<Value>,
    #[serde(default)]
    pub generated_by_turn_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub sensitivity: Sensitivity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemorySort {
    CreatedDesc,
    CreatedAsc,
}

impl Default for MemorySort {
    fn default() -> Self {
        Self::CreatedDesc
    }
}

/// Search filter. `cursor` is the opaque continuation token returned by
/// the previous page.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Case-insensitive substring match on `content`.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tier: Option<MemoryTier>,
    #[serde(default)]
    pub scope: Option<MemoryScope>,
    #[serde(default)]
    pub sort: MemorySort,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub cursor: Option<String>,
}

fn default_limit() -> u64 {
    50
}

/// One page of search results. `total_count` counts every match, not
/// just this page; `cursor` is `None` on the final page.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPage {
    pub items: Vec<MemoryItem>,
    #[serde(default)]
    pub cursor: Option<String>,
    pub total_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_round_trips() {
        assert_eq!(MemoryTier::parse("Semantic"), Some(MemoryTier::Semantic));
        assert_eq!(MemoryScope::parse("Global"), Some(MemoryScope::Global));
        assert_eq!(Sensitivity::parse("Restricted"), Some(Sensitivity::Restricted));
        assert_eq!(MemoryTier::parse("semantic"), None);
    }

    #[test]
    fn query_defaults() {
        let q: MemoryQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(q.sort, MemorySort::CreatedDesc);
        assert_eq!(q.limit, 50);
        assert!(q.cursor.is_none());
    }
}
