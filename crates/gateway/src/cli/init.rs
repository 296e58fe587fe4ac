//! `agent init` — write a starter configuration file.

use std::path::Path;

use anyhow::bail;

const TEMPLATE: &str = r#"# Personal-agent runtime configuration.
providers:
  anthropic:
    apiKeyEnv: ANTHROPIC_API_KEY

agents:
  main:
    persona:
      name: Aria
      systemPrompt: >-
        You are Aria, a concise personal assistant. Answer directly and
        keep track of the user's ongoing projects.
    model:
      provider: anthropic
      modelId: claude-sonnet-4-5
    generation:
      temperature: 0.7
      maxOutputTokens: 2048
    budget:
      tokenBudget: 1000000
      quotaPeriod: daily

server:
  port: 3210

sessions:
  tokenCapacity: 200000

scheduler:
  tickSeconds: 10
  strictUnknownActions: false
"#;

pub fn init(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    std::fs::write(path, TEMPLATE)?;
    println!("Wrote {}.", path.display());
    println!("Set ANTHROPIC_API_KEY (or edit providers) and run `agent serve`.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pa_domain::config::{Config, ProviderKind};

    #[test]
    fn template_parses_and_validates() {
        let config: Config = serde_yaml::from_str(TEMPLATE).unwrap();
        assert!(config.validate().is_empty());
        let agent = config.agent("main").unwrap();
        assert_eq!(agent.model.provider, ProviderKind::Anthropic);
        assert_eq!(config.server.port, 3210);
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        init(&path).unwrap();
        assert!(init(&path).is_err());
    }
}
