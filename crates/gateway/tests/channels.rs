//! Channel endpoint behaviour, driven through the handlers directly.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::TimeZone;

use pa_domain::clock::{ManualClock, SequentialIds};
use pa_domain::config::Config;
use pa_domain::session::ChannelType;
use pa_gateway::api::channels::{self, ChannelMessageRequest, CreateChannelRequest};
use pa_gateway::bootstrap::build_services_with;
use pa_gateway::state::AppState;
use pa_providers::OfflineFactory;
use pa_storage::{ChannelStore as _, MemoryBackend, SessionStore as _};

fn build_state() -> (AppState, Arc<MemoryBackend>) {
    let config: Config = serde_yaml::from_str(
        r#"
providers:
  anthropic: { apiKeyEnv: TEST_ANTHROPIC_KEY }
agents:
  main:
    persona: { name: Aria, systemPrompt: "You are Aria." }
    model: { provider: anthropic, modelId: test-model }
sessions: { tokenCapacity: 4096 }
"#,
    )
    .unwrap();

    let store = Arc::new(MemoryBackend::new());
    let services = build_services_with(
        Arc::new(config),
        store.clone(),
        Arc::new(ManualClock::new(
            chrono::Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap(),
        )),
        Arc::new(SequentialIds::default()),
        Arc::new(OfflineFactory),
    )
    .unwrap();
    (services.state, store)
}

#[tokio::test]
async fn create_binds_channel_to_fresh_session() {
    let (state, store) = build_state();

    let resp = channels::create(
        State(state),
        Path("ch-1".to_owned()),
        Json(CreateChannelRequest {
            channel_type: ChannelType::Web,
            agent_id: "main".to_owned(),
        }),
    )
    .await
    .into_response();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let channel = store.get_channel("ch-1").unwrap().unwrap();
    assert_eq!(channel.agent_id, "main");
    assert_eq!(channel.channel_type, ChannelType::Web);

    let session = store.get_session(&channel.active_session_id).unwrap().unwrap();
    assert_eq!(session.token_capacity, 4096);
    assert_eq!(session.tokens_used, 0);
}

#[tokio::test]
async fn create_rejects_unknown_agent() {
    let (state, store) = build_state();

    let resp = channels::create(
        State(state),
        Path("ch-1".to_owned()),
        Json(CreateChannelRequest {
            channel_type: ChannelType::Cli,
            agent_id: "nobody".to_owned(),
        }),
    )
    .await
    .into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(store.get_channel("ch-1").unwrap().is_none());
}

#[tokio::test]
async fn message_on_unknown_channel_is_not_found() {
    let (state, _store) = build_state();

    let resp = channels::messages(
        State(state),
        Path("ghost".to_owned()),
        Json(ChannelMessageRequest {
            content: "hello".to_owned(),
        }),
    )
    .await
    .into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn message_on_channel_streams_ok() {
    let (state, _store) = build_state();

    channels::create(
        State(state.clone()),
        Path("ch-1".to_owned()),
        Json(CreateChannelRequest {
            channel_type: ChannelType::Cli,
            agent_id: "main".to_owned(),
        }),
    )
    .await
    .into_response();

    let resp = channels::messages(
        State(state),
        Path("ch-1".to_owned()),
        Json(ChannelMessageRequest {
            content: "ping".to_owned(),
        }),
    )
    .await
    .into_response();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
}
