//! `agent chat` — interactive REPL command.
//!
//! Boots the full runtime in-process (same wiring as `serve`, including
//! the scheduler), binds or resumes a channel, and streams each turn's
//! events to the terminal.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;

use pa_domain::clock::{Clock as _, IdGenerator as _};
use pa_domain::config::{db_path_from_env, Config};
use pa_domain::session::{Channel, ChannelType, Session};
use pa_domain::turn::{ContentBlock, SubmitTurnRequest, TurnStreamEvent};
use pa_storage::{ChannelStore as _, SessionStore as _, SqliteBackend};

use crate::bootstrap;
use crate::runtime::{estimate_tokens, spawn_turn};
use crate::state::AppState;

/// Run the interactive chat REPL until Ctrl+D.
pub async fn chat(config: Arc<Config>, channel_id: Option<String>) -> anyhow::Result<()> {
    let store = Arc::new(SqliteBackend::open(&db_path_from_env())?);
    let services = bootstrap::build_services(config.clone(), store)?;
    bootstrap::spawn_background_tasks(&services);
    let state = services.state.clone();

    let agent_id = config
        .agents
        .keys()
        .min()
        .cloned()
        .context("no agents configured — run `agent init` first")?;

    let channel_id = channel_id.unwrap_or_else(|| "cli".to_owned());
    let channel = resolve_channel(&state, &channel_id, &agent_id)?;

    eprintln!("personal-agent chat");
    eprintln!(
        "Channel: {}  |  Agent: {}  |  Ctrl+D to exit",
        channel.channel_id, channel.agent_id
    );
    eprintln!();

    let mut rl = rustyline::DefaultEditor::new()?;
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();
                run_one_turn(&state, &channel, trimmed).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    state.cancel.cancel();
    Ok(())
}

/// Resume the channel, or bind it to `agent_id` with a fresh session.
fn resolve_channel(
    state: &AppState,
    channel_id: &str,
    agent_id: &str,
) -> anyhow::Result<Channel> {
    if let Some(channel) = state.storage.get_channel(channel_id)? {
        return Ok(channel);
    }

    let session_id = state.ids.next_id().to_string();
    let conversation_id = state.ids.next_id().to_string();
    state.storage.start_session(&Session::new(
        session_id.clone(),
        conversation_id.clone(),
        state.config.sessions.token_capacity,
    ))?;

    let channel = Channel {
        channel_id: channel_id.to_owned(),
        channel_type: ChannelType::Cli,
        agent_id: agent_id.to_owned(),
        active_session_id: session_id,
        active_conversation_id: conversation_id,
        created_at: state.clock.now(),
    };
    state.storage.upsert_channel(&channel)?;
    Ok(channel)
}

async fn run_one_turn(state: &AppState, channel: &Channel, text: &str) {
    let req = SubmitTurnRequest {
        turn_id: state.ids.next_id().to_string(),
        session_id: channel.active_session_id.clone(),
        conversation_id: channel.active_conversation_id.clone(),
        agent_id: channel.agent_id.clone(),
        content: text.to_owned(),
        content_blocks: vec![ContentBlock::Text {
            text: text.to_owned(),
        }],
        created_at: state.clock.now(),
        input_tokens: estimate_tokens(text),
    };

    let handle = spawn_turn(state, req);
    let (snapshot, mut rx) = handle.snapshot_and_subscribe();

    let mut done = false;
    for event in snapshot {
        done = render(&event);
        if done {
            break;
        }
    }
    while !done {
        match rx.recv().await {
            Ok(event) => done = render(&event),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

/// Print one event; returns whether the turn is over.
fn render(event: &TurnStreamEvent) -> bool {
    match event {
        TurnStreamEvent::AssistantDelta { delta, .. } => {
            print!("{delta}");
            let _ = std::io::stdout().flush();
            false
        }
        TurnStreamEvent::ToolCall { tool_name, .. } => {
            eprintln!("[tool call: {tool_name}]");
            false
        }
        TurnStreamEvent::ToolResult {
            tool_name,
            is_error,
            ..
        } => {
            eprintln!(
                "[tool result: {tool_name}{}]",
                if *is_error { " (error)" } else { "" }
            );
            false
        }
        TurnStreamEvent::TurnCompleted { .. } => {
            println!();
            true
        }
        TurnStreamEvent::TurnFailed {
            error_code,
            message,
            ..
        } => {
            eprintln!("error [{error_code}]: {message}");
            true
        }
        TurnStreamEvent::TurnStarted { .. } => false,
    }
}
