use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::models::{SyncError, SyncErrorKind};

/// Replay window per run. Late subscribers see at most this many events.
const HISTORY_LIMIT: usize = 200;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    Status,
    Log,
    Done,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressLevel {
    Info,
    Warning,
    Error,
}

/// One progress frame on a run's stream. Serialized as-is onto the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event: ProgressEventKind,
    pub message: String,
    pub level: ProgressLevel,
    pub ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ProgressEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::build(ProgressEventKind::Status, message, ProgressLevel::Info)
    }

    pub fn log(message: impl Into<String>, level: ProgressLevel) -> Self {
        Self::build(ProgressEventKind::Log, message, level)
    }

    pub fn done(message: impl Into<String>, level: ProgressLevel) -> Self {
        Self::build(ProgressEventKind::Done, message, level)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Server-sent-events framing for this event.
    pub fn sse_frame(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {json}\n\n")
    }

    fn build(event: ProgressEventKind, message: impl Into<String>, level: ProgressLevel) -> Self {
        Self {
            event,
            message: message.into(),
            level,
            ts: Utc::now().to_rfc3339(),
            url: None,
        }
    }
}

#[derive(Default)]
struct RunChannel {
    history: VecDeque<ProgressEvent>,
    subscribers: Vec<UnboundedSender<ProgressEvent>>,
    completed: bool,
}

/// Fan-out hub for live run progress. Every published event is kept in a
/// bounded per-run history so a subscriber that connects mid-run (or after
/// completion) replays what it missed before receiving live events.
#[derive(Clone, Default)]
pub struct RunStreamManager {
    runs: Arc<Mutex<HashMap<String, RunChannel>>>,
}

impl RunStreamManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run and hand back its identifier.
    pub async fn create_run(&self) -> String {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let mut runs = self.runs.lock().await;
        runs.insert(run_id.clone(), RunChannel::default());
        run_id
    }

    /// Attach to a run. The receiver first yields the run's history in
    /// publish order, then live events. For a completed run the channel ends
    /// right after the replay.
    pub async fn subscribe(
        &self,
        run_id: &str,
    ) -> Result<UnboundedReceiver<ProgressEvent>, SyncError> {
        let mut runs = self.runs.lock().await;
        let channel = runs.get_mut(run_id).ok_or_else(|| {
            SyncError::new(
                SyncErrorKind::InvalidInput,
                format!("unknown run id '{run_id}'"),
            )
        })?;

        let (sender, receiver) = unbounded_channel();
        for event in &channel.history {
            // Receiver is still in scope, the send cannot fail here.
            let _ = sender.send(event.clone());
        }
        if !channel.completed {
            channel.subscribers.push(sender);
        }
        Ok(receiver)
    }

    /// Publish an event to a run's history and live subscribers. Events for
    /// unknown runs are dropped; events published after completion still land
    /// in the history for diagnostics but reach no subscriber.
    pub async fn publish(&self, run_id: &str, event: ProgressEvent) {
        let targets = {
            let mut runs = self.runs.lock().await;
            let Some(channel) = runs.get_mut(run_id) else {
                tracing::debug!(run_id, "dropping progress event for unknown run");
                return;
            };

            if channel.history.len() >= HISTORY_LIMIT {
                channel.history.pop_front();
            }
            channel.history.push_back(event.clone());

            if channel.completed {
                return;
            }
            channel.subscribers.clone()
        };

        // Fan-out happens with the lock released. Unbounded send never
        // blocks; a failed send means the receiver is gone.
        let mut any_closed = false;
        for sender in &targets {
            if sender.send(event.clone()).is_err() {
                any_closed = true;
            }
        }
        if !any_closed {
            return;
        }

        let mut runs = self.runs.lock().await;
        if let Some(channel) = runs.get_mut(run_id) {
            channel.subscribers.retain(|sender| !sender.is_closed());
        }
    }

    /// Publish the terminal event and close the run's live side. The history
    /// stays available for post-completion subscribers.
    pub async fn mark_done(&self, run_id: &str, event: ProgressEvent) {
        let subscribers = {
            let mut runs = self.runs.lock().await;
            let Some(channel) = runs.get_mut(run_id) else {
                tracing::debug!(run_id, "dropping terminal event for unknown run");
                return;
            };
            if channel.completed {
                return;
            }

            if channel.history.len() >= HISTORY_LIMIT {
                channel.history.pop_front();
            }
            channel.history.push_back(event.clone());
            channel.completed = true;
            channel.subscribers.drain(..).collect::<Vec<_>>()
        };

        for sender in subscribers {
            let _ = sender.send(event.clone());
        }
    }

    pub async fn history(&self, run_id: &str) -> Vec<ProgressEvent> {
        let runs = self.runs.lock().await;
        runs.get(run_id)
            .map(|channel| channel.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn is_completed(&self, run_id: &str) -> bool {
        let runs = self.runs.lock().await;
        runs.get(run_id)
            .map(|channel| channel.completed)
            .unwrap_or(false)
    }
}
