//! Activity store
//!
//! In-memory session and action tables plus the run → session cache.
//!
//! ## Merge rules
//!
//! - Sessions merge by key; a patch's set fields win.
//! - Deltas of a run aggregate into one streaming record at `{run_id}-stream`.
//!   A terminal event for the run flips that record's type in place; its id
//!   never changes.
//! - Tool calls, tool results and terminal events without a streaming record
//!   are inserted under their natural id. Re-delivery is a no-op.
//! - Actions arriving without a usable session key pick one up from the run
//!   cache, and streaming records are corrected retroactively once the run's
//!   session is learned.
//!
//! The store never fails on bad input. It is not synchronized: all writes
//! must go through one owner (see [`crate::runtime`]).

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;

use crate::types::{
    is_concrete_session_key, Action, ActionType, Session, SessionPatch, SessionStatus,
    LIFECYCLE_SESSION_KEY,
};

/// What `add_action` did with an incoming action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Created the streaming record of a run
    StreamStarted,
    /// Appended to an existing streaming record
    StreamAppended,
    /// Flipped a streaming record to a terminal type
    StreamClosed,
    /// Inserted under the natural id
    Inserted,
    /// A record already existed at the natural id
    Duplicate,
}

/// Session and action tables, keyed and insertion-ordered.
#[derive(Debug, Default)]
pub struct ActivityStore {
    sessions: IndexMap<String, Session>,
    actions: IndexMap<String, Action>,
    run_sessions: HashMap<String, String>,
}

impl ActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Sessions ==========

    /// Insert a session or shallow-merge into the existing one.
    pub fn upsert_session(&mut self, patch: SessionPatch) {
        self.upsert_session_at(patch, Utc::now());
    }

    /// Like [`Self::upsert_session`], with an explicit creation time for new
    /// sessions whose patch carries no activity timestamp.
    pub fn upsert_session_at(&mut self, patch: SessionPatch, now: DateTime<Utc>) {
        match self.sessions.get_mut(&patch.key) {
            Some(session) => session.apply(&patch),
            None => {
                let mut session =
                    Session::new(patch.key.clone(), patch.last_activity_at.unwrap_or(now));
                session.apply(&patch);
                tracing::debug!(session_key = %session.key, "New session");
                self.sessions.insert(session.key.clone(), session);
            }
        }
    }

    /// Set a session's status and refresh its activity time.
    ///
    /// Returns false (and does nothing) if the session is unknown.
    pub fn update_session_status(&mut self, key: &str, status: SessionStatus) -> bool {
        self.update_session(
            key,
            &SessionPatch::new(key)
                .with_status(status)
                .with_last_activity(Utc::now()),
        )
    }

    /// Merge a patch into a known session.
    ///
    /// Returns false (and does nothing) if the session is unknown.
    pub fn update_session(&mut self, key: &str, patch: &SessionPatch) -> bool {
        match self.sessions.get_mut(key) {
            Some(session) => {
                session.apply(patch);
                true
            }
            None => {
                tracing::trace!(session_key = %key, "Ignoring update for unknown session");
                false
            }
        }
    }

    pub fn session(&self, key: &str) -> Option<&Session> {
        self.sessions.get(key)
    }

    /// Sessions in first-seen order.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> + '_ {
        self.sessions.values()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // ========== Actions ==========

    /// Merge one action into the timeline.
    pub fn add_action(&mut self, action: Action) -> AddOutcome {
        // Learn the run's session whenever the action names a real one.
        if action.has_resolved_session() {
            if let Some(key) = &action.session_key {
                self.run_sessions.insert(action.run_id.clone(), key.clone());
            }
        }

        let resolved_key = self.resolve_session_key(&action);
        let stream_id = Action::stream_id(&action.run_id);

        if action.action_type == ActionType::Delta {
            return match self.actions.get_mut(&stream_id) {
                Some(existing) => {
                    let fragment = action.content.as_deref().unwrap_or("");
                    existing
                        .content
                        .get_or_insert_with(String::new)
                        .push_str(fragment);
                    existing.seq = action.seq;
                    existing.timestamp = action.timestamp;
                    if is_concrete_session_key(resolved_key.as_deref()) {
                        existing.session_key = resolved_key;
                    }
                    AddOutcome::StreamAppended
                }
                None => {
                    if !is_concrete_session_key(resolved_key.as_deref()) {
                        tracing::trace!(run_id = %action.run_id, "Streaming action has no session yet");
                    }
                    let record = Action {
                        id: stream_id.clone(),
                        session_key: resolved_key,
                        ..action
                    };
                    self.actions.insert(stream_id, record);
                    AddOutcome::StreamStarted
                }
            };
        }

        if action.action_type.is_terminal() {
            if let Some(existing) = self.actions.get_mut(&stream_id) {
                existing.action_type = action.action_type;
                existing.seq = action.seq;
                existing.timestamp = action.timestamp;
                if is_concrete_session_key(resolved_key.as_deref()) {
                    existing.session_key = resolved_key;
                }
                return AddOutcome::StreamClosed;
            }
            tracing::debug!(
                run_id = %action.run_id,
                action_type = %action.action_type,
                "Terminal event without a stream, storing standalone"
            );
        }

        if self.actions.contains_key(&action.id) {
            tracing::trace!(action_id = %action.id, "Ignoring re-delivered action");
            return AddOutcome::Duplicate;
        }

        let record = Action {
            session_key: resolved_key,
            ..action
        };
        self.actions.insert(record.id.clone(), record);
        AddOutcome::Inserted
    }

    /// The action's own key when concrete, else the cached key for its run,
    /// else whatever the action carried (absent or the sentinel).
    fn resolve_session_key(&self, action: &Action) -> Option<String> {
        match action.session_key.as_deref() {
            None | Some(LIFECYCLE_SESSION_KEY) => self
                .run_sessions
                .get(&action.run_id)
                .cloned()
                .or_else(|| action.session_key.clone()),
            Some(_) => action.session_key.clone(),
        }
    }

    /// Session learned for a run, if any.
    pub fn session_key_for_run(&self, run_id: &str) -> Option<&str> {
        self.run_sessions.get(run_id).map(String::as_str)
    }

    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.get(id)
    }

    /// Actions in table (insertion) order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> + '_ {
        self.actions.values()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn run_cache_len(&self) -> usize {
        self.run_sessions.len()
    }

    /// Empty both tables. The run cache survives.
    pub fn clear(&mut self) {
        tracing::info!(
            sessions = self.sessions.len(),
            actions = self.actions.len(),
            "Clearing activity tables"
        );
        self.sessions.clear();
        self.actions.clear();
    }
}
