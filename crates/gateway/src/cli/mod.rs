//! Command-line interface for the `agent` binary.

pub mod chat;
pub mod init;
pub mod status;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use pa_domain::config::Config;

/// Personal-agent runtime.
#[derive(Debug, Parser)]
#[command(name = "agent", version, about)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "agent.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP gateway (default when no subcommand is given).
    Serve,
    /// Interactive chat REPL against the local runtime.
    Chat {
        /// Channel to chat on; created on first use.
        #[arg(long)]
        channel: Option<String>,
    },
    /// Query a running server's health and runtime status.
    Status,
    /// Write a starter agent.yaml in the current directory.
    Init,
}

/// Load the config file, falling back to defaults when it is absent.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Ok(Config::load(path)?)
    } else {
        tracing::warn!(
            path = %path.display(),
            "config file not found, using defaults (run `agent init`)"
        );
        Ok(Config::default())
    }
}
