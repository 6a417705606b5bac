//! Ingest runtime
//!
//! Every mutation of the [`ActivityStore`] is funneled through one actor task:
//!
//! ```text
//! ┌──────────────┐
//! │ GatewayClient│──Frame / Disconnected──┐
//! └──────────────┘                        ▼
//!                                  ┌─────────────┐   watch   ┌──────────────┐
//!                                  │ ingest actor│──────────►│ StoreSnapshot│──► graph / lists
//!                                  └─────────────┘           └──────────────┘
//! ┌──────────────┐                        ▲
//! │ SessionPoller│──────Snapshot──────────┘
//! └──────────────┘
//! ```
//!
//! Readers never touch the store; they get immutable snapshots.

mod gateway;
mod poller;

pub use gateway::{next_backoff, GatewayClient};
pub use poller::{parse_snapshot_body, SessionPoller, SessionSnapshot};

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::graph::{project, Graph, GraphFilter};
use crate::normalize::{normalize_frame, RunPhase};
use crate::store::{ActivityStore, AddOutcome};
use crate::types::{Action, Session, SessionPatch, SessionStatus};

/// Input to the ingest actor.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    /// One raw frame from the gateway socket
    Frame(serde_json::Value),
    /// Session listing from the poll
    Snapshot(Vec<SessionSnapshot>),
    /// The socket dropped; the timeline starts over
    Disconnected,
}

/// What applying one event changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Sessions upserted or updated
    pub sessions: Vec<String>,
    /// Action id the store touched, with what it did
    pub action: Option<(String, AddOutcome)>,
    /// Tables were cleared
    pub cleared: bool,
    /// The frame was dropped by the normalizer
    pub dropped: bool,
}

impl Applied {
    pub fn changed(&self) -> bool {
        self.cleared
            || !self.sessions.is_empty()
            || matches!(self.action, Some((_, outcome)) if outcome != AddOutcome::Duplicate)
    }
}

/// Apply one event to the store. Never fails; unusable input is counted as dropped.
pub fn apply_event(store: &mut ActivityStore, event: IngestEvent) -> Applied {
    let mut applied = Applied::default();

    match event {
        IngestEvent::Frame(frame) => {
            let Some(normalized) = normalize_frame(&frame) else {
                applied.dropped = true;
                return applied;
            };

            if let Some(patch) = normalized.session {
                applied.sessions.push(patch.key.clone());
                store.upsert_session(patch);
            }

            if let Some(action) = normalized.action {
                let stream_id = Action::stream_id(&action.run_id);
                let natural_id = action.id.clone();
                let outcome = store.add_action(action);
                let id = match outcome {
                    AddOutcome::StreamStarted
                    | AddOutcome::StreamAppended
                    | AddOutcome::StreamClosed => stream_id,
                    AddOutcome::Inserted | AddOutcome::Duplicate => natural_id,
                };
                applied.action = Some((id, outcome));
            }

            if let Some(event) = normalized.run_phase {
                let status = match event.phase {
                    RunPhase::Start => SessionStatus::Thinking,
                    RunPhase::End | RunPhase::Error => SessionStatus::Idle,
                };
                match store.session_key_for_run(&event.run_id).map(str::to_string) {
                    Some(key) => {
                        if store.update_session_status(&key, status) {
                            applied.sessions.push(key);
                        }
                    }
                    None => {
                        tracing::trace!(run_id = %event.run_id, "Run phase for unknown run");
                    }
                }
            }
        }
        IngestEvent::Snapshot(records) => {
            tracing::debug!(count = records.len(), "Applying session snapshot");
            for record in records {
                let mut patch = SessionPatch::new(record.key.clone());
                patch.last_activity_at = record.last_activity_at;
                applied.sessions.push(record.key);
                store.upsert_session(patch);
            }
        }
        IngestEvent::Disconnected => {
            store.clear();
            applied.cleared = true;
        }
    }

    applied
}

/// Immutable copy of the store published to readers.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Bumped on every change
    pub version: u64,
    pub sessions: Vec<Session>,
    pub actions: Vec<Action>,
}

impl StoreSnapshot {
    pub fn capture(store: &ActivityStore, version: u64) -> Self {
        Self {
            version,
            sessions: store.sessions().cloned().collect(),
            actions: store.actions().cloned().collect(),
        }
    }

    pub fn graph(&self, filter: &GraphFilter) -> Graph {
        project(&self.sessions, &self.actions, filter)
    }
}

/// Channels connecting collaborators to a running ingest actor.
pub struct IngestHandle {
    pub events: mpsc::Sender<IngestEvent>,
    pub snapshots: watch::Receiver<Arc<StoreSnapshot>>,
    pub task: JoinHandle<ActivityStore>,
}

/// Spawn the ingest actor. It stops, returning the store, once every sender is dropped.
pub fn spawn_ingest(buffer: usize) -> IngestHandle {
    let (events, rx) = mpsc::channel(buffer.max(1));
    let (tx, snapshots) = watch::channel(Arc::new(StoreSnapshot::default()));
    let task = tokio::spawn(run_ingest(rx, tx));
    IngestHandle {
        events,
        snapshots,
        task,
    }
}

async fn run_ingest(
    mut rx: mpsc::Receiver<IngestEvent>,
    tx: watch::Sender<Arc<StoreSnapshot>>,
) -> ActivityStore {
    let mut store = ActivityStore::new();
    let mut version = 0u64;

    while let Some(event) = rx.recv().await {
        let applied = apply_event(&mut store, event);
        if applied.changed() {
            version += 1;
            tx.send_replace(Arc::new(StoreSnapshot::capture(&store, version)));
        }
    }

    tracing::info!(
        sessions = store.session_count(),
        actions = store.action_count(),
        "Ingest channel closed"
    );
    store
}
