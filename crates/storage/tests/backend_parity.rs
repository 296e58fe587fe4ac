//! Both backends must expose identical semantics; every scenario here
//! runs against the in-memory and the SQLite implementation.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use pa_domain::agent::{AgentRecord, QuotaPeriod};
use pa_domain::audit::{AuditEntry, PolicyDecision};
use pa_domain::memory::{
    MemoryItem, MemoryQuery, MemoryScope, MemorySort, MemorySource, MemoryTier, Sensitivity,
};
use pa_domain::schedule::{
    ExecutionOutcome, RecurrencePattern, Schedule, ScheduleDelta, ScheduleStatus, ScheduleTrigger,
    ScheduledExecution, TriggerSource,
};
use pa_domain::session::{Channel, ChannelType, Session};
use pa_domain::turn::ParticipantRole;
use pa_storage::{
    AgentStore as _, AuditStore as _, ChannelStore as _, ExecutionStore as _, MemoryBackend,
    MemoryStore as _, NewTurn, ScheduleStore as _, SessionStore as _, SqliteBackend, Storage,
    TurnStore as _,
};

fn backends() -> Vec<(&'static str, Box<dyn Storage>)> {
    vec![
        ("mem", Box::new(MemoryBackend::new())),
        ("sqlite", Box::new(SqliteBackend::open_in_memory().unwrap())),
    ]
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap()
}

fn new_turn(id: &str, session_id: &str) -> NewTurn {
    NewTurn {
        turn_id: id.into(),
        session_id: session_id.into(),
        conversation_id: "c1".into(),
        participant_role: ParticipantRole::User,
        message_id: format!("msg-{id}"),
        message_content: format!("content of {id}"),
        content_blocks: vec![],
        model_finish_reason: None,
        model_usage_json: None,
        created_at: t0(),
    }
}

fn schedule(id: &str, interval_seconds: Option<i64>) -> Schedule {
    Schedule {
        schedule_id: id.into(),
        owner_agent_id: "main".into(),
        recurrence_pattern: RecurrencePattern {
            label: "every minute".into(),
            cron_expression: None,
            interval_seconds,
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

fn execution(id: Uuid, schedule_id: &str) -> ScheduledExecution {
    ScheduledExecution {
        execution_id: id,
        schedule_id: schedule_id.into(),
        due_at: t0(),
        trigger_source: TriggerSource::IntervalTick,
        outcome: ExecutionOutcome::Succeeded,
        started_at: t0(),
        ended_at: Some(t0() + chrono::Duration::milliseconds(5)),
        skip_reason: None,
        created_at: t0(),
    }
}

fn audit(id: &str, reason: &str, at: DateTime<Utc>) -> AuditEntry {
    AuditEntry {
        audit_entry_id: id.into(),
        agent_id: "main".into(),
        session_id: None,
        decision: PolicyDecision::Allow,
        reason: reason.into(),
        created_at: at,
    }
}

fn memory_item(id: &str, minute: u32) -> MemoryItem {
    let at = Utc.with_ymd_and_hms(2024, 6, 15, 10, minute, 0).unwrap();
    MemoryItem {
        memory_item_id: id.into(),
        agent_id: "main".into(),
        tier: MemoryTier::Episodic,
        scope: MemoryScope::Project,
        source: MemorySource::Agent,
        content: format!("observation {id}"),
        metadata_json: None,
        generated_by_turn_id: None,
        session_id: None,
        sensitivity: Sensitivity::Internal,
        created_at: at,
        updated_at: at,
    }
}

#[test]
fn turn_indices_form_dense_prefix() {
    for (name, store) in backends() {
        store.start_session(&Session::new("s1", "c1", 1000)).unwrap();
        for i in 0..5 {
            let assigned = store.append_turn(&new_turn(&format!("t{i}"), "s1")).unwrap();
            assert_eq!(assigned, Some(i as u64), "{name}");
        }
        let indices: Vec<u64> = store
            .list_turns("s1")
            .unwrap()
            .iter()
            .map(|t| t.turn_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4], "{name}");
    }
}

#[test]
fn duplicate_turn_append_leaves_set_unchanged() {
    for (name, store) in backends() {
        store.append_turn(&new_turn("t1", "s1")).unwrap();
        store.append_turn(&new_turn("t2", "s1")).unwrap();

        let mut dup = new_turn("t1", "s1");
        dup.message_content = "different content".into();
        assert_eq!(store.append_turn(&dup).unwrap(), None, "{name}");

        let turns = store.list_turns("s1").unwrap();
        assert_eq!(turns.len(), 2, "{name}");
        assert_eq!(turns[0].message_content, "content of t1", "{name}");
    }
}

#[test]
fn budget_consumes_resets_and_rejects() {
    for (name, store) in backends() {
        store
            .upsert_agent(&AgentRecord::new("main", 100, QuotaPeriod::Daily))
            .unwrap();

        assert_eq!(store.consume_token_budget("main", 60, t0()).unwrap(), 40, "{name}");

        let err = store.consume_token_budget("main", 50, t0()).unwrap_err();
        assert_eq!(err.error_code(), "TokenBudgetExceeded", "{name}");

        // After the daily window rolls over, the counter resets to the
        // requested amount.
        let next_day = t0() + chrono::Duration::days(1);
        assert_eq!(
            store.consume_token_budget("main", 50, next_day).unwrap(),
            50,
            "{name}"
        );
        let agent = store.get_agent("main").unwrap().unwrap();
        assert_eq!(agent.tokens_consumed, 50, "{name}");
    }
}

#[test]
fn context_window_clamps_and_breaches() {
    for (name, store) in backends() {
        store.start_session(&Session::new("s1", "c1", 100)).unwrap();

        assert_eq!(store.update_context_window("s1", 90).unwrap(), 90, "{name}");
        assert_eq!(store.update_context_window("s1", -200).unwrap(), 0, "{name}");
        store.update_context_window("s1", 90).unwrap();

        let err = store.update_context_window("s1", 20).unwrap_err();
        match err {
            pa_domain::Error::ContextWindowExceeded {
                token_capacity,
                attempted_tokens_used,
                ..
            } => {
                assert_eq!(token_capacity, 100, "{name}");
                assert_eq!(attempted_tokens_used, 110, "{name}");
            }
            other => panic!("{name}: unexpected error {other}"),
        }
        // The failed update must not change state.
        assert_eq!(
            store.get_session("s1").unwrap().unwrap().tokens_used,
            90,
            "{name}"
        );
    }
}

#[test]
fn submit_execution_is_idempotent() {
    for (name, store) in backends() {
        store.upsert_schedule(&schedule("sched-1", Some(60))).unwrap();

        let id = Uuid::from_u128(7);
        let exec = execution(id, "sched-1");
        let delta = ScheduleDelta {
            last_execution_at: t0(),
            next_execution_at: Some(t0() + chrono::Duration::seconds(60)),
            schedule_status: None,
        };

        let first = store
            .submit_execution(
                &exec,
                &delta,
                &audit("a1", "scheduler_command_completed", t0()),
                &audit("a1-ignored", "scheduler_command_ignored", t0()),
            )
            .unwrap();
        assert!(first, "{name}");

        let second = store
            .submit_execution(
                &exec,
                &delta,
                &audit("a2", "scheduler_command_completed", t0() + chrono::Duration::seconds(1)),
                &audit("a2-ignored", "scheduler_command_ignored", t0() + chrono::Duration::seconds(1)),
            )
            .unwrap();
        assert!(!second, "{name}");

        // Exactly one row, two audits: completed then ignored.
        assert_eq!(store.list_executions("sched-1").unwrap().len(), 1, "{name}");
        let reasons: Vec<String> = store
            .list_audit()
            .unwrap()
            .into_iter()
            .map(|a| a.reason)
            .collect();
        assert_eq!(
            reasons,
            vec!["scheduler_command_completed", "scheduler_command_ignored"],
            "{name}"
        );

        // The schedule advanced exactly once.
        let stored = store.get_schedule("sched-1").unwrap().unwrap();
        assert_eq!(
            stored.next_execution_at,
            Some(t0() + chrono::Duration::seconds(60)),
            "{name}"
        );
        assert_eq!(stored.last_execution_at, Some(t0()), "{name}");
    }
}

#[test]
fn execution_round_trips_outcome_string() {
    for (name, store) in backends() {
        store.upsert_schedule(&schedule("sched-1", Some(60))).unwrap();
        let id = Uuid::from_u128(9);
        let mut exec = execution(id, "sched-1");
        exec.outcome = ExecutionOutcome::Skipped;
        exec.skip_reason = Some("policy denied".into());
        store
            .submit_execution(
                &exec,
                &ScheduleDelta {
                    last_execution_at: t0(),
                    next_execution_at: None,
                    schedule_status: None,
                },
                &audit("a1", "scheduler_command_completed", t0()),
                &audit("a1x", "scheduler_command_ignored", t0()),
            )
            .unwrap();

        let stored = store.get_execution(id).unwrap().unwrap();
        assert_eq!(stored.outcome, ExecutionOutcome::Skipped, "{name}");
        assert_eq!(stored.outcome.as_str(), "ExecutionSkipped", "{name}");
        assert_eq!(stored.skip_reason.as_deref(), Some("policy denied"), "{name}");
    }
}

#[test]
fn memory_search_paginates_newest_first() {
    for (name, store) in backends() {
        for i in 0..25 {
            store.encode_memory(&memory_item(&format!("m{i:02}"), i)).unwrap();
        }

        let mut query = MemoryQuery {
            agent_id: Some("main".into()),
            limit: 10,
            ..Default::default()
        };

        let page1 = store.search_memory(&query).unwrap();
        assert_eq!(page1.items.len(), 10, "{name}");
        assert_eq!(page1.total_count, 25, "{name}");
        assert_eq!(page1.items[0].memory_item_id, "m24", "{name}");
        assert!(page1.cursor.is_some(), "{name}");

        query.cursor = page1.cursor;
        let page2 = store.search_memory(&query).unwrap();
        assert_eq!(page2.items.len(), 10, "{name}");
        assert_eq!(page2.total_count, 25, "{name}");

        query.cursor = page2.cursor;
        let page3 = store.search_memory(&query).unwrap();
        assert_eq!(page3.items.len(), 5, "{name}");
        assert_eq!(page3.cursor, None, "{name}");
        assert_eq!(page3.total_count, 25, "{name}");
        assert_eq!(page3.items.last().unwrap().memory_item_id, "m00", "{name}");
    }
}

#[test]
fn memory_search_ascending_reverses_default_order() {
    for (name, store) in backends() {
        for i in 0..5 {
            store.encode_memory(&memory_item(&format!("m{i}"), i)).unwrap();
        }
        let query = MemoryQuery {
            sort: MemorySort::CreatedAsc,
            limit: 10,
            ..Default::default()
        };
        let page = store.search_memory(&query).unwrap();
        assert_eq!(page.items[0].memory_item_id, "m0", "{name}");
        assert_eq!(page.items[4].memory_item_id, "m4", "{name}");
    }
}

#[test]
fn forget_removes_exactly_pre_cutoff_items() {
    for (name, store) in backends() {
        for i in 0..10 {
            store.encode_memory(&memory_item(&format!("m{i}"), i)).unwrap();
        }
        // Items of another agent must be untouched.
        let mut other = memory_item("other", 0);
        other.agent_id = "other-agent".into();
        store.encode_memory(&other).unwrap();

        let cutoff = Utc.with_ymd_and_hms(2024, 6, 15, 10, 4, 0).unwrap();
        let deleted = store.forget_memory("main", cutoff).unwrap();
        assert_eq!(deleted, 4, "{name}");

        let remaining = store
            .search_memory(&MemoryQuery {
                agent_id: Some("main".into()),
                limit: 100,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(remaining.total_count, 6, "{name}");
        assert!(
            remaining.items.iter().all(|i| i.created_at >= cutoff),
            "{name}"
        );

        let others = store
            .search_memory(&MemoryQuery {
                agent_id: Some("other-agent".into()),
                limit: 100,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(others.total_count, 1, "{name}");
    }
}

#[test]
fn channel_upsert_and_resume() {
    for (name, store) in backends() {
        let channel = Channel {
            channel_id: "ch-1".into(),
            channel_type: ChannelType::Cli,
            agent_id: "main".into(),
            active_session_id: "s1".into(),
            active_conversation_id: "c1".into(),
            created_at: t0(),
        };
        store.upsert_channel(&channel).unwrap();

        // Re-creating the channel swaps the active session.
        let mut rebound = channel.clone();
        rebound.active_session_id = "s2".into();
        store.upsert_channel(&rebound).unwrap();

        let stored = store.get_channel("ch-1").unwrap().unwrap();
        assert_eq!(stored.active_session_id, "s2", "{name}");
        assert_eq!(stored.channel_type, ChannelType::Cli, "{name}");
    }
}
