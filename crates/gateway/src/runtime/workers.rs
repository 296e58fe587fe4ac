//! Per-turn worker registry.
//!
//! Concurrent submissions with the same `turn_id` are deduplicated: the
//! first caller spawns the pipeline worker, everyone gets a handle onto
//! the same event stream. Each handle keeps a replay buffer so a late
//! subscriber (or a retry after completion) observes the identical
//! sequence from the start.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use pa_domain::turn::TurnStreamEvent;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Live + replayable event stream of one turn.
pub struct TurnHandle {
    events: Mutex<Vec<TurnStreamEvent>>,
    tx: broadcast::Sender<TurnStreamEvent>,
}

impl TurnHandle {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            events: Mutex::new(Vec::new()),
            tx,
        }
    }

    /// Record and fan out one event. The buffer lock spans the send so a
    /// subscriber sees every event exactly once (either replayed or
    /// live).
    pub fn push(&self, event: TurnStreamEvent) {
        let mut events = self.events.lock();
        events.push(event.clone());
        let _ = self.tx.send(event);
    }

    /// Replay buffer snapshot plus a live receiver, taken atomically.
    pub fn snapshot_and_subscribe(
        &self,
    ) -> (Vec<TurnStreamEvent>, broadcast::Receiver<TurnStreamEvent>) {
        let events = self.events.lock();
        (events.clone(), self.tx.subscribe())
    }

    /// All events recorded so far.
    pub fn recorded(&self) -> Vec<TurnStreamEvent> {
        self.events.lock().clone()
    }

    /// Whether a terminal event has been recorded.
    pub fn is_done(&self) -> bool {
        self.events.lock().iter().any(|e| e.is_terminal())
    }
}

/// Registry of in-flight and completed turn workers, keyed by `turn_id`.
///
/// Completed handles are kept so duplicate submissions replay the
/// recorded result instead of re-running the pipeline.
#[derive(Default)]
pub struct TurnWorkers {
    inner: Mutex<HashMap<String, Arc<TurnHandle>>>,
}

impl TurnWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the handle for `turn_id`, creating it when absent. The
    /// second element is `true` when this call created the handle — the
    /// caller then owns spawning the worker.
    pub fn get_or_create(&self, turn_id: &str) -> (Arc<TurnHandle>, bool) {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.get(turn_id) {
            return (handle.clone(), false);
        }
        let handle = Arc::new(TurnHandle::new());
        inner.insert(turn_id.to_owned(), handle.clone());
        (handle, true)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
