//! Scheduler dispatch loop — the ticker that claims due windows, runs
//! the action executor, and submits outcomes to the command lane.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use pa_domain::clock::Clock;
use pa_domain::Result;

use crate::command_lane::{CommandLane, CommandPayload};
use crate::executor::ActionExecutor;
use crate::runtime::SchedulerRuntime;

/// Counters of one tick: `claimed == dispatched` always, and
/// `accepted <= dispatched` (a failed lane transaction is not accepted).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub claimed: usize,
    pub dispatched: usize,
    pub accepted: usize,
}

pub struct DispatchLoop {
    runtime: Arc<SchedulerRuntime>,
    executor: Arc<ActionExecutor>,
    lane: Arc<CommandLane>,
    clock: Arc<dyn Clock>,
    period: Duration,
}

impl DispatchLoop {
    pub fn new(
        runtime: Arc<SchedulerRuntime>,
        executor: Arc<ActionExecutor>,
        lane: Arc<CommandLane>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> Self {
        Self {
            runtime,
            executor,
            lane,
            clock,
            period,
        }
    }

    /// Run the ticker until cancelled. Ticks never overlap: a tick that
    /// outlives the period is followed immediately by the next one.
    /// Cancellation interrupts the sleep, never an in-progress tick.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("scheduler dispatch loop stopping");
                    return;
                }
                _ = interval.tick() => {
                    let now = self.clock.now();
                    if let Err(e) = self.dispatch_due(now) {
                        tracing::warn!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }
    }

    /// One full tick at `now`. Public so tests and manual triggers can
    /// drive the loop without the ticker.
    pub fn dispatch_due(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let tickets = self.runtime.claim_due(now)?;
        let claimed = tickets.len();
        let mut dispatched = 0usize;
        let mut accepted = 0usize;

        for ticket in tickets {
            let result = self.executor.execute(&ticket);
            let ended_at = self.clock.now();
            let (delta, _was_in_flight) =
                self.runtime
                    .complete_execution(&ticket, result.outcome, ended_at);
            dispatched += 1;

            let payload = CommandPayload {
                ticket,
                outcome: result.outcome,
                ended_at,
                skip_reason: result.skip_reason,
                delta,
            };
            match self.lane.execute(&payload) {
                Ok(receipt) if receipt.accepted => accepted += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        execution_id = %payload.ticket.execution_id,
                        error = %e,
                        "command lane submission failed"
                    );
                }
            }
        }

        tracing::info!(claimed, dispatched, accepted, "scheduler tick");
        Ok(TickSummary {
            claimed,
            dispatched,
            accepted,
        })
    }
}
