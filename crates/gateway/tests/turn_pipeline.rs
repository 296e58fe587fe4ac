//! Turn pipeline properties: dense monotonic sequences, gate-check
//! failures as first-frame `turn.failed`, duplicate-turn dedupe, and
//! assistant-turn assembly from streamed model parts.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::broadcast::error::RecvError;

use pa_domain::clock::{ManualClock, SequentialIds};
use pa_domain::config::Config;
use pa_domain::stream::{ModelPart, TokenUsage};
use pa_domain::turn::{
    ContentBlock, ParticipantRole, SubmitTurnRequest, TurnStreamEvent, FAILURE_SEQUENCE,
};
use pa_domain::Result;
use pa_gateway::bootstrap::build_services_with;
use pa_gateway::runtime::{spawn_turn, TurnHandle};
use pa_gateway::state::AppState;
use pa_providers::{LanguageModel, ModelBinding, ModelFactory, ScriptedModel};
use pa_storage::{AgentStore as _, MemoryBackend, SessionStore as _, TurnStore as _};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap()
}

struct ScriptedFactory {
    parts: Vec<ModelPart>,
}

impl ModelFactory for ScriptedFactory {
    fn create(&self, _binding: &ModelBinding) -> Result<Arc<dyn LanguageModel>> {
        Ok(Arc::new(ScriptedModel::new(self.parts.clone())))
    }
}

fn test_config(token_budget: u64) -> Config {
    serde_yaml::from_str(&format!(
        r#"
providers:
  anthropic: {{ apiKeyEnv: TEST_ANTHROPIC_KEY }}
agents:
  main:
    persona: {{ name: Aria, systemPrompt: "You are Aria." }}
    model: {{ provider: anthropic, modelId: test-model }}
    budget: {{ tokenBudget: {token_budget} }}
sessions: {{ tokenCapacity: 100 }}
"#
    ))
    .unwrap()
}

fn build_state(config: Config, parts: Vec<ModelPart>) -> (AppState, Arc<MemoryBackend>) {
    let store = Arc::new(MemoryBackend::new());
    let services = build_services_with(
        Arc::new(config),
        store.clone(),
        Arc::new(ManualClock::new(t0())),
        Arc::new(SequentialIds::default()),
        Arc::new(ScriptedFactory { parts }),
    )
    .unwrap();
    (services.state, store)
}

fn submit_request(turn_id: &str, input_tokens: u64) -> SubmitTurnRequest {
    SubmitTurnRequest {
        turn_id: turn_id.into(),
        session_id: "s1".into(),
        conversation_id: "c1".into(),
        agent_id: "main".into(),
        content: "hello there".into(),
        content_blocks: vec![ContentBlock::Text {
            text: "hello there".into(),
        }],
        created_at: t0(),
        input_tokens,
    }
}

async fn collect(handle: Arc<TurnHandle>) -> Vec<TurnStreamEvent> {
    let (snapshot, mut rx) = handle.snapshot_and_subscribe();
    let mut events = snapshot;
    if events.iter().any(|e| e.is_terminal()) {
        return events;
    }
    loop {
        match rx.recv().await {
            Ok(event) => {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    break;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    events
}

fn start_session(store: &MemoryBackend, capacity: u64) {
    store
        .start_session(&pa_domain::session::Session::new("s1", "c1", capacity))
        .unwrap();
}

fn rich_script() -> Vec<ModelPart> {
    vec![
        ModelPart::TextDelta {
            text: "Hello".into(),
        },
        ModelPart::TextDelta {
            text: " there".into(),
        },
        ModelPart::ToolCall {
            tool_call_id: "call-1".into(),
            tool_name: "lookup".into(),
            input_json: serde_json::json!({"q": "weather"}),
        },
        ModelPart::ToolResult {
            tool_call_id: "call-1".into(),
            tool_name: "lookup".into(),
            output_json: serde_json::json!({"answer": "sunny"}),
            is_error: false,
        },
        ModelPart::Media {
            media_type: "image/png".into(),
            source: "data:...".into(),
            alt_text: Some("chart".into()),
        },
        ModelPart::Media {
            media_type: "application/pdf".into(),
            source: "data:...".into(),
            alt_text: None,
        },
        ModelPart::Finished {
            finish_reason: Some("stop".into()),
            usage: Some(TokenUsage {
                input_tokens: 0,
                output_tokens: 7,
                total_tokens: 7,
            }),
        },
    ]
}

#[tokio::test]
async fn happy_path_emits_dense_sequence_and_persists_assistant_turn() {
    let (state, store) = build_state(test_config(1_000_000), rich_script());
    start_session(&store, 100);

    let events = collect(spawn_turn(&state, submit_request("t1", 10))).await;

    // One turn.started at sequence 0, strictly increasing dense
    // sequence, exactly one terminal event.
    let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        types,
        vec![
            "turn.started",
            "assistant.delta",
            "assistant.delta",
            "tool.call",
            "tool.result",
            "turn.completed",
        ]
    );
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence()).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    // User + assistant turn, indices 0 and 1.
    let turns = store.list_turns("s1").unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].participant_role, ParticipantRole::User);
    let assistant = &turns[1];
    assert_eq!(assistant.participant_role, ParticipantRole::Assistant);
    assert_eq!(assistant.turn_index, 1);
    assert_eq!(assistant.message_content, "Hello there");
    assert_eq!(assistant.model_finish_reason.as_deref(), Some("stop"));

    // Text concatenated first, then tool blocks, then the image; the
    // non-image media part is dropped.
    match &assistant.content_blocks[..] {
        [ContentBlock::Text { text }, ContentBlock::ToolUse { tool_name, .. }, ContentBlock::ToolResult { is_error, .. }, ContentBlock::Image { media_type, .. }] =>
        {
            assert_eq!(text, "Hello there");
            assert_eq!(tool_name, "lookup");
            assert!(!is_error);
            assert_eq!(media_type, "image/png");
        }
        other => panic!("unexpected blocks: {other:?}"),
    }

    // Session accumulated input + output tokens; budget reserved input.
    let session = store.get_session("s1").unwrap().unwrap();
    assert_eq!(session.tokens_used, 17);
    let agent = store.get_agent("main").unwrap().unwrap();
    assert_eq!(agent.tokens_consumed, 10);
}

#[tokio::test]
async fn context_window_breach_fails_before_start() {
    let (state, store) = build_state(test_config(1_000_000), rich_script());
    start_session(&store, 100);
    store.update_context_window("s1", 90).unwrap();

    let events = collect(spawn_turn(&state, submit_request("t1", 20))).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        TurnStreamEvent::TurnFailed {
            sequence,
            error_code,
            message,
            ..
        } => {
            assert_eq!(*sequence, FAILURE_SEQUENCE);
            assert_eq!(error_code, "ContextWindowExceeded");
            assert!(message.contains("110"), "message: {message}");
        }
        other => panic!("expected turn.failed, got {other:?}"),
    }

    // Nothing was appended and no budget was reserved.
    assert_eq!(store.turn_count("s1").unwrap(), 0);
    assert_eq!(store.get_agent("main").unwrap().unwrap().tokens_consumed, 0);
}

#[tokio::test]
async fn budget_breach_fails_with_token_budget_code() {
    let (state, store) = build_state(test_config(5), rich_script());
    start_session(&store, 100);

    let events = collect(spawn_turn(&state, submit_request("t1", 10))).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        TurnStreamEvent::TurnFailed { error_code, .. } => {
            assert_eq!(error_code, "TokenBudgetExceeded");
        }
        other => panic!("expected turn.failed, got {other:?}"),
    }
    assert_eq!(store.turn_count("s1").unwrap(), 0);
}

#[tokio::test]
async fn missing_session_fails_with_session_not_found() {
    let (state, store) = build_state(test_config(1_000_000), rich_script());

    let events = collect(spawn_turn(&state, submit_request("t1", 10))).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        TurnStreamEvent::TurnFailed { error_code, .. } => {
            assert_eq!(error_code, "SessionNotFound");
        }
        other => panic!("expected turn.failed, got {other:?}"),
    }
    assert_eq!(store.turn_count("s1").unwrap(), 0);
}

#[tokio::test]
async fn unconfigured_agent_fails_after_start() {
    let (state, store) = build_state(test_config(1_000_000), rich_script());
    start_session(&store, 100);
    store
        .upsert_agent(&pa_domain::agent::AgentRecord::new(
            "ghost",
            1_000,
            Default::default(),
        ))
        .unwrap();

    let mut req = submit_request("t1", 10);
    req.agent_id = "ghost".into();
    let events = collect(spawn_turn(&state, req)).await;

    assert_eq!(events[0].event_type(), "turn.started");
    match events.last().unwrap() {
        TurnStreamEvent::TurnFailed { error_code, .. } => {
            assert_eq!(error_code, "TurnProcessingError");
        }
        other => panic!("expected turn.failed, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_turn_id_replays_the_same_stream() {
    let (state, store) = build_state(test_config(1_000_000), rich_script());
    start_session(&store, 100);

    let first = collect(spawn_turn(&state, submit_request("t1", 10))).await;
    // Resubmitting the identical turn joins the recorded stream; no
    // second pipeline runs.
    let second = collect(spawn_turn(&state, submit_request("t1", 10))).await;

    let first_kinds: Vec<(&str, u64)> =
        first.iter().map(|e| (e.event_type(), e.sequence())).collect();
    let second_kinds: Vec<(&str, u64)> =
        second.iter().map(|e| (e.event_type(), e.sequence())).collect();
    assert_eq!(first_kinds, second_kinds);

    // Only one user + one assistant turn exist.
    assert_eq!(store.turn_count("s1").unwrap(), 2);
    // Budget was reserved exactly once.
    assert_eq!(store.get_agent("main").unwrap().unwrap().tokens_consumed, 10);
}

#[tokio::test]
async fn concurrent_same_turn_submissions_share_one_pipeline() {
    let (state, store) = build_state(test_config(1_000_000), rich_script());
    start_session(&store, 100);

    let h1 = spawn_turn(&state, submit_request("t1", 10));
    let h2 = spawn_turn(&state, submit_request("t1", 10));
    assert!(Arc::ptr_eq(&h1, &h2));

    let (a, b) = tokio::join!(collect(h1), collect(h2));
    assert_eq!(a.len(), b.len());
    assert_eq!(store.turn_count("s1").unwrap(), 2);
}

#[tokio::test]
async fn turns_on_same_session_are_serialized() {
    let (state, store) = build_state(test_config(1_000_000), rich_script());
    start_session(&store, 100);

    let h1 = spawn_turn(&state, submit_request("t1", 5));
    let h2 = spawn_turn(&state, submit_request("t2", 5));
    let (_, _) = tokio::join!(collect(h1), collect(h2));

    // Four turns with dense indices regardless of interleaving.
    let turns = store.list_turns("s1").unwrap();
    let indices: Vec<u64> = turns.iter().map(|t| t.turn_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);

    // Strict ordering: each user turn is directly followed by its
    // assistant turn.
    assert_eq!(turns[0].participant_role, ParticipantRole::User);
    assert_eq!(turns[1].participant_role, ParticipantRole::Assistant);
    assert_eq!(turns[2].participant_role, ParticipantRole::User);
    assert_eq!(turns[3].participant_role, ParticipantRole::Assistant);
}
