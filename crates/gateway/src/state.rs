//! Shared application state passed to all API handlers and workers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pa_domain::clock::{Clock, IdGenerator};
use pa_domain::config::Config;
use pa_providers::ModelRegistry;
use pa_storage::Storage;

use crate::runtime::{SessionLockMap, TurnWorkers};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn Storage>,
    pub models: Arc<ModelRegistry>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    /// Per-session turn serialization.
    pub session_locks: Arc<SessionLockMap>,
    /// Per-turn worker registry (dedupe by `turn_id`).
    pub turn_workers: Arc<TurnWorkers>,
    /// Top-level shutdown signal observed by all tasks and streams.
    pub cancel: CancellationToken,
}
