use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pa_domain::config::{db_path_from_env, Config};
use pa_gateway::api;
use pa_gateway::bootstrap::{build_services, spawn_background_tasks};
use pa_gateway::cli::{self, Cli, Command};
use pa_storage::SqliteBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    match args.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing("info,pa_gateway=debug");
            let config = Arc::new(cli::load_config(&args.config)?);
            run_server(config).await
        }
        Some(Command::Chat { channel }) => {
            // Keep the terminal clean for the REPL.
            init_tracing("warn");
            let config = Arc::new(cli::load_config(&args.config)?);
            cli::chat::chat(config, channel).await
        }
        Some(Command::Status) => {
            let config = cli::load_config(&args.config)?;
            cli::status::status(&config).await
        }
        Some(Command::Init) => cli::init::init(&args.config),
    }
}

/// Structured JSON tracing, overridable via `RUST_LOG`.
fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("personal-agent starting");

    for issue in config.validate() {
        tracing::warn!(%issue, "configuration issue");
    }

    let db_path = db_path_from_env();
    let store = Arc::new(SqliteBackend::open(&db_path)?);
    tracing::info!(db_path = %db_path.display(), "storage opened");

    let services = build_services(config.clone(), store)?;
    spawn_background_tasks(&services);

    let app = api::router(services.state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gateway listening");

    let cancel = services.state.cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            cancel.cancel();
        })
        .await?;

    Ok(())
}
