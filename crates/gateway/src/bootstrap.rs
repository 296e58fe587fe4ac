//! Process wiring — builds the dependency graph and spawns the
//! long-lived background tasks.

use std::sync::Arc;
use std::time::Duration;

use pa_domain::agent::AgentRecord;
use pa_domain::clock::{Clock, IdGenerator, RandomIds, SystemClock};
use pa_domain::config::Config;
use pa_domain::Result;
use pa_governance::Governance;
use pa_providers::{ModelFactory, ModelRegistry, OfflineFactory};
use pa_scheduler::{ActionExecutor, CommandLane, DispatchLoop, SchedulerRuntime};
use pa_storage::{AgentStore as _, Storage};
use tokio_util::sync::CancellationToken;

use crate::runtime::{SessionLockMap, TurnWorkers};
use crate::state::AppState;

/// Everything `serve`/`chat` need: the shared state plus the dispatch
/// loop waiting to be spawned.
pub struct Services {
    pub state: AppState,
    pub dispatch: Arc<DispatchLoop>,
}

/// Build the service graph with production defaults (system clock,
/// random ids, offline model factory).
pub fn build_services<S>(config: Arc<Config>, store: Arc<S>) -> Result<Services>
where
    S: Storage + 'static,
{
    build_services_with(
        config,
        store,
        Arc::new(SystemClock),
        Arc::new(RandomIds),
        Arc::new(OfflineFactory),
    )
}

/// Build the service graph with explicit seams — tests inject a manual
/// clock, sequential ids, and scripted models here.
pub fn build_services_with<S>(
    config: Arc<Config>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    factory: Arc<dyn ModelFactory>,
) -> Result<Services>
where
    S: Storage + 'static,
{
    seed_agents(&config, store.as_ref())?;

    let models = Arc::new(ModelRegistry::new(config.clone(), factory));
    let governance = Arc::new(Governance::new(store.clone()));

    let runtime = Arc::new(SchedulerRuntime::new(store.clone(), ids.clone()));
    let lane = Arc::new(CommandLane::new(store.clone(), clock.clone(), ids.clone()));
    let executor = Arc::new(ActionExecutor::new(
        governance,
        clock.clone(),
        ids.clone(),
        config.scheduler.strict_unknown_actions,
    ));
    let dispatch = Arc::new(DispatchLoop::new(
        runtime,
        executor,
        lane,
        clock.clone(),
        Duration::from_secs(config.scheduler.tick_seconds),
    ));

    let state = AppState {
        config,
        storage: store,
        models,
        clock,
        ids,
        session_locks: Arc::new(SessionLockMap::new()),
        turn_workers: Arc::new(TurnWorkers::new()),
        cancel: CancellationToken::new(),
    };

    Ok(Services { state, dispatch })
}

/// Ensure every configured agent has a budget record. Existing records
/// keep their consumption state.
fn seed_agents<S: Storage>(config: &Config, store: &S) -> Result<()> {
    for (agent_id, agent_cfg) in &config.agents {
        if store.get_agent(agent_id)?.is_none() {
            store.upsert_agent(&AgentRecord::new(
                agent_id.clone(),
                agent_cfg.budget.token_budget,
                agent_cfg.budget.quota_period,
            ))?;
            tracing::info!(agent_id = %agent_id, "seeded agent record");
        }
    }
    Ok(())
}

/// Spawn the scheduler dispatch loop and periodic housekeeping. All
/// tasks stop when the state's cancellation token fires.
pub fn spawn_background_tasks(services: &Services) {
    {
        let dispatch = services.dispatch.clone();
        let cancel = services.state.cancel.clone();
        tokio::spawn(async move {
            dispatch.run(cancel).await;
        });
    }

    {
        let locks = services.state.session_locks.clone();
        let cancel = services.state.cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = interval.tick() => locks.prune_idle(),
                }
            }
        });
    }
}
