//! Scheduler runtime — turns schedule state into in-flight execution
//! tickets and folds completed tickets back into schedule deltas.
//!
//! The runtime owns the in-process ticket set only; persistence of
//! executions and schedule updates happens in the command lane.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use pa_domain::clock::IdGenerator;
use pa_domain::schedule::{
    ExecutionOutcome, ExecutionTicket, Schedule, ScheduleDelta, ScheduleStatus, TriggerSource,
};
use pa_domain::Result;
use pa_storage::ScheduleStore;

use crate::recurrence;

pub struct SchedulerRuntime {
    schedules: Arc<dyn ScheduleStore>,
    ids: Arc<dyn IdGenerator>,
    in_flight: Mutex<HashMap<Uuid, ExecutionTicket>>,
}

impl SchedulerRuntime {
    pub fn new(schedules: Arc<dyn ScheduleStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            schedules,
            ids,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Claim every due window across all schedules as a fresh ticket.
    pub fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ExecutionTicket>> {
        let mut tickets = Vec::new();
        for schedule in self.schedules.list_schedules()? {
            for due_at in recurrence::due_windows(&schedule, now) {
                tickets.push(self.register_ticket(
                    &schedule,
                    due_at,
                    TriggerSource::from_trigger(schedule.trigger),
                    now,
                ));
            }
        }
        Ok(tickets)
    }

    /// Emit a single `Manual` ticket regardless of schedule status, or
    /// `None` when the schedule has no valid recurrence.
    pub fn trigger_now(&self, schedule: &Schedule, now: DateTime<Utc>) -> Option<ExecutionTicket> {
        if !schedule.recurrence_pattern.is_recurrent() {
            return None;
        }
        Some(self.register_ticket(schedule, now, TriggerSource::Manual, now))
    }

    /// Fold a finished ticket into the schedule delta the command lane
    /// will apply. Returns the delta and whether the runtime still
    /// considered the ticket in-flight.
    pub fn complete_execution(
        &self,
        ticket: &ExecutionTicket,
        outcome: ExecutionOutcome,
        ended_at: DateTime<Utc>,
    ) -> (ScheduleDelta, bool) {
        let was_in_flight = self
            .in_flight
            .lock()
            .remove(&ticket.execution_id)
            .is_some();

        tracing::debug!(
            execution_id = %ticket.execution_id,
            schedule_id = %ticket.schedule_id,
            outcome = outcome.as_str(),
            ended_at = %ended_at,
            was_in_flight,
            "execution completed"
        );

        let schedule = self
            .schedules
            .get_schedule(&ticket.schedule_id)
            .ok()
            .flatten();

        let mut delta = ScheduleDelta {
            last_execution_at: ticket.due_at,
            next_execution_at: schedule
                .as_ref()
                .and_then(|s| recurrence::next_after_completion(s, ticket.due_at)),
            schedule_status: None,
        };

        if schedule.is_some_and(|s| s.auto_disable_after_run) {
            delta.schedule_status = Some(ScheduleStatus::Disabled);
            delta.next_execution_at = None;
        }

        (delta, was_in_flight)
    }

    /// Number of tickets claimed but not yet completed.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn register_ticket(
        &self,
        schedule: &Schedule,
        due_at: DateTime<Utc>,
        trigger_source: TriggerSource,
        now: DateTime<Utc>,
    ) -> ExecutionTicket {
        let ticket = ExecutionTicket {
            execution_id: self.ids.next_id(),
            schedule_id: schedule.schedule_id.clone(),
            owner_agent_id: schedule.owner_agent_id.clone(),
            due_at,
            trigger_source,
            started_at: now,
            action_ref: schedule.action_ref.clone(),
        };
        self.in_flight
            .lock()
            .insert(ticket.execution_id, ticket.clone());
        ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pa_domain::clock::SequentialIds;
    use pa_domain::schedule::{RecurrencePattern, ScheduleTrigger};
    use pa_storage::{MemoryBackend, ScheduleStore as _};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap()
    }

    fn schedule(id: &str) -> Schedule {
        Schedule {
            schedule_id: id.into(),
            owner_agent_id: "main".into(),
            recurrence_pattern: RecurrencePattern {
                label: "every minute".into(),
                cron_expression: None,
                interval_seconds: Some(60),
            },
            trigger: ScheduleTrigger::Interval,
            action_ref: "action:log".into(),
            schedule_status: ScheduleStatus::Active,
            concurrency_policy: Default::default(),
            allows_catch_up: true,
            auto_disable_after_run: false,
            catch_up_window_seconds: 3600,
            max_catch_up_runs_per_tick: 10,
            last_execution_at: None,
            next_execution_at: Some(t0()),
        }
    }

    fn runtime(store: Arc<MemoryBackend>) -> SchedulerRuntime {
        SchedulerRuntime::new(store, Arc::new(SequentialIds::default()))
    }

    #[test]
    fn claim_registers_in_flight_tickets() {
        let store = Arc::new(MemoryBackend::new());
        store.upsert_schedule(&schedule("s1")).unwrap();
        let runtime = runtime(store);

        let tickets = runtime.claim_due(t0()).unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].trigger_source, TriggerSource::IntervalTick);
        assert_eq!(tickets[0].due_at, t0());
        assert_eq!(runtime.in_flight_count(), 1);
    }

    #[test]
    fn completion_clears_in_flight_and_advances_next() {
        let store = Arc::new(MemoryBackend::new());
        store.upsert_schedule(&schedule("s1")).unwrap();
        let runtime = runtime(store);

        let ticket = runtime.claim_due(t0()).unwrap().remove(0);
        let (delta, was_in_flight) = runtime.complete_execution(
            &ticket,
            ExecutionOutcome::Succeeded,
            t0() + chrono::Duration::seconds(1),
        );
        assert!(was_in_flight);
        assert_eq!(delta.last_execution_at, t0());
        assert_eq!(
            delta.next_execution_at,
            Some(t0() + chrono::Duration::seconds(60))
        );
        assert_eq!(delta.schedule_status, None);
        assert_eq!(runtime.in_flight_count(), 0);

        // A second completion of the same ticket is no longer in-flight.
        let (_, again) =
            runtime.complete_execution(&ticket, ExecutionOutcome::Succeeded, t0());
        assert!(!again);
    }

    #[test]
    fn auto_disable_clears_next_and_disables() {
        let store = Arc::new(MemoryBackend::new());
        let mut s = schedule("s1");
        s.auto_disable_after_run = true;
        store.upsert_schedule(&s).unwrap();
        let runtime = runtime(store);

        let ticket = runtime.claim_due(t0()).unwrap().remove(0);
        let (delta, _) =
            runtime.complete_execution(&ticket, ExecutionOutcome::Succeeded, t0());
        assert_eq!(delta.schedule_status, Some(ScheduleStatus::Disabled));
        assert_eq!(delta.next_execution_at, None);
    }

    #[test]
    fn trigger_now_ignores_status_but_needs_recurrence() {
        let store = Arc::new(MemoryBackend::new());
        let runtime = runtime(store);

        let mut s = schedule("s1");
        s.schedule_status = ScheduleStatus::Paused;
        let ticket = runtime.trigger_now(&s, t0()).unwrap();
        assert_eq!(ticket.trigger_source, TriggerSource::Manual);
        assert_eq!(ticket.due_at, t0());

        s.recurrence_pattern.cron_expression = None;
        s.recurrence_pattern.interval_seconds = None;
        assert!(runtime.trigger_now(&s, t0()).is_none());
    }
}
