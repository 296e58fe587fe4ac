//! Pure recurrence arithmetic — no clock reads, no storage.

use chrono::{DateTime, Duration, Utc};

use pa_domain::schedule::{Schedule, ScheduleStatus};

/// The due windows a schedule owes at `now`, earliest first.
///
/// Gate conditions, in order: the schedule is `Active`, has a
/// `next_execution_at`, has a recurrence source, and that next fire time
/// has been reached. A missing or non-positive interval yields the single
/// fixed point. Interval schedules walk `next, +interval, …` up to `now`,
/// restricted to the catch-up window when one is configured; catch-up
/// schedules keep at most `max_catch_up_runs_per_tick` windows, others
/// collapse to the most recent one.
pub fn due_windows(schedule: &Schedule, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    if schedule.schedule_status != ScheduleStatus::Active {
        return vec![];
    }
    let Some(next) = schedule.next_execution_at else {
        return vec![];
    };
    if !schedule.recurrence_pattern.is_recurrent() {
        return vec![];
    }
    if next > now {
        return vec![];
    }

    let interval = schedule.recurrence_pattern.interval_seconds.unwrap_or(0);
    if interval <= 0 {
        return vec![next];
    }

    let mut cursor = next;

    // Skip windows that fell out of the catch-up horizon.
    if schedule.catch_up_window_seconds > 0 {
        let horizon = now - Duration::seconds(schedule.catch_up_window_seconds);
        if cursor < horizon {
            let gap = (horizon - cursor).num_seconds();
            let steps = (gap + interval - 1) / interval;
            cursor += Duration::seconds(steps * interval);
        }
    }
    if cursor > now {
        return vec![];
    }

    if !schedule.allows_catch_up {
        // Only the most recent elapsed window fires.
        let gap = (now - cursor).num_seconds();
        return vec![cursor + Duration::seconds((gap / interval) * interval)];
    }

    let cap = schedule.max_catch_up_runs_per_tick.max(0) as usize;
    let mut windows = Vec::new();
    while cursor <= now && windows.len() < cap {
        windows.push(cursor);
        cursor += Duration::seconds(interval);
    }
    windows
}

/// Where `next_execution_at` lands once the window at `due_at` has run.
///
/// Interval schedules advance from the executed window; fixed-point
/// schedules keep a future fire time if one is already set, otherwise
/// they have nothing left to do.
pub fn next_after_completion(schedule: &Schedule, due_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let interval = schedule.recurrence_pattern.interval_seconds.unwrap_or(0);
    if interval > 0 {
        return Some(due_at + Duration::seconds(interval));
    }
    match schedule.next_execution_at {
        Some(existing) if existing > due_at => Some(existing),
        _ => None,
    }
}
