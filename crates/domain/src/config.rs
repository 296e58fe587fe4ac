//! YAML configuration model (`agent.yaml`).
//!
//! Keys are camelCase on disk. Provider names are a closed enum — an
//! unknown provider fails decoding instead of being silently carried.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::QuotaPeriod;
use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<ProviderKind, ProviderConfig>,
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Load and decode `agent.yaml`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        serde_yaml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Non-fatal configuration issues, surfaced at startup.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.agents.is_empty() {
            issues.push("no agents configured — turns will be rejected".to_owned());
        }
        for (agent_id, agent) in &self.agents {
            if !self.providers.contains_key(&agent.model.provider) {
                issues.push(format!(
                    "agent {agent_id} references provider {} with no providers entry",
                    agent.model.provider
                ));
            }
        }
        issues
    }

    pub fn agent(&self, agent_id: &str) -> Option<&AgentConfig> {
        self.agents.get(agent_id)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The supported model providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    Openai,
    Openrouter,
    Google,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Openai => "openai",
            Self::Openrouter => "openrouter",
            Self::Google => "google",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub persona: PersonaConfig,
    pub model: ModelRef,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaConfig {
    pub name: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRef {
    pub provider: ProviderKind,
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn d_temperature() -> f32 {
    0.7
}

fn d_max_output_tokens() -> u32 {
    2048
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: d_temperature(),
            max_output_tokens: d_max_output_tokens(),
            top_p: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetConfig {
    #[serde(default = "d_token_budget")]
    pub token_budget: u64,
    #[serde(default)]
    pub quota_period: QuotaPeriod,
}

fn d_token_budget() -> u64 {
    1_000_000
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            token_budget: d_token_budget(),
            quota_period: QuotaPeriod::default(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server / sessions / scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
}

fn d_port() -> u16 {
    3210
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: d_port() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsConfig {
    /// Context-window capacity assigned to newly started sessions.
    #[serde(default = "d_token_capacity")]
    pub token_capacity: u64,
}

fn d_token_capacity() -> u64 {
    200_000
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            token_capacity: d_token_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    #[serde(default = "d_tick_seconds")]
    pub tick_seconds: u64,
    /// When set, unknown `action:` refs are skipped instead of succeeding.
    #[serde(default)]
    pub strict_unknown_actions: bool,
}

fn d_tick_seconds() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: d_tick_seconds(),
            strict_unknown_actions: false,
        }
    }
}

/// Database location: `PERSONAL_AGENT_DB_PATH`, defaulting next to the
/// working directory.
pub fn db_path_from_env() -> std::path::PathBuf {
    std::env::var("PERSONAL_AGENT_DB_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("./personal-agent.sqlite"))
}
