//! Core domain types for gatewatch
//!
//! These types are the canonical timeline produced from gateway frames.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Frame** | One message from the gateway describing a chat or agent-internal event |
//! | **Run** | One invocation of the agent, identified by `run_id` |
//! | **Session** | A conversation thread, keyed by agent/platform/recipient |
//! | **Action** | One unit of agent output: a text stream, a tool call, a tool result, or a terminal outcome |
//! | **Streaming action** | The single mutable record aggregating every delta (and the terminal state) of a run |
//!
//! ### Sentinel session key
//!
//! Agent-internal frames on the lifecycle stream carry [`LIFECYCLE_SESSION_KEY`]
//! where a session key would be. It means "not known yet", which is different
//! from an absent key; both are backfilled from the run cache in the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session_key::parse_session_key;

/// Placeholder session key meaning "not yet known".
pub const LIFECYCLE_SESSION_KEY: &str = "lifecycle";

/// Returns true if `key` names a real session (present and not the sentinel).
pub fn is_concrete_session_key(key: Option<&str>) -> bool {
    matches!(key, Some(k) if !k.is_empty() && k != LIFECYCLE_SESSION_KEY)
}

// ============================================
// Sessions
// ============================================

/// What a session is doing right now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No run in flight
    #[default]
    Idle,
    /// A run is streaming deltas
    Thinking,
    /// A run produced output recently
    Active,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Thinking => "thinking",
            SessionStatus::Active => "active",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SessionStatus::Idle),
            "thinking" => Ok(SessionStatus::Thinking),
            "active" => Ok(SessionStatus::Active),
            _ => Err(format!("unknown session status: {}", s)),
        }
    }
}

/// A logical conversation on one messaging surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Stable identity, unique across the table
    pub key: String,
    /// Agent serving this conversation (parsed from `key`)
    pub agent_id: Option<String>,
    /// Messaging platform (parsed from `key`)
    pub platform: Option<String>,
    /// Peer or group identifier on the platform (parsed from `key`)
    pub recipient: Option<String>,
    /// Whether the conversation is a group or channel
    pub is_group: bool,
    pub status: SessionStatus,
    /// Only ever moves forward
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Create an idle session, filling the components from the key when it decomposes.
    pub fn new(key: impl Into<String>, last_activity_at: DateTime<Utc>) -> Self {
        let key = key.into();
        let parts = parse_session_key(&key);
        Self {
            agent_id: parts.as_ref().map(|p| p.agent_id.clone()),
            platform: parts.as_ref().map(|p| p.platform.clone()),
            recipient: parts.as_ref().map(|p| p.recipient.clone()),
            is_group: parts.as_ref().map(|p| p.is_group).unwrap_or(false),
            key,
            status: SessionStatus::Idle,
            last_activity_at,
        }
    }

    /// Shallow-merge a patch into this session. Set fields win, except that
    /// `last_activity_at` never moves backwards.
    pub fn apply(&mut self, patch: &SessionPatch) {
        if let Some(agent_id) = &patch.agent_id {
            self.agent_id = Some(agent_id.clone());
        }
        if let Some(platform) = &patch.platform {
            self.platform = Some(platform.clone());
        }
        if let Some(recipient) = &patch.recipient {
            self.recipient = Some(recipient.clone());
        }
        if let Some(is_group) = patch.is_group {
            self.is_group = is_group;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ts) = patch.last_activity_at {
            if ts > self.last_activity_at {
                self.last_activity_at = ts;
            }
        }
    }

    /// Human-friendly label, e.g. "telegram/12345 (group)".
    pub fn label(&self) -> String {
        match (&self.platform, &self.recipient) {
            (Some(platform), Some(recipient)) if self.is_group => {
                format!("{}/{} (group)", platform, recipient)
            }
            (Some(platform), Some(recipient)) => format!("{}/{}", platform, recipient),
            _ => self.key.clone(),
        }
    }
}

/// Partial session update. Only `key` is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    pub key: String,
    pub agent_id: Option<String>,
    pub platform: Option<String>,
    pub recipient: Option<String>,
    pub is_group: Option<bool>,
    pub status: Option<SessionStatus>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl SessionPatch {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_last_activity(mut self, ts: DateTime<Utc>) -> Self {
        self.last_activity_at = Some(ts);
        self
    }

    /// Fill the key components from the key itself.
    ///
    /// Returns `None` when the key does not decompose.
    pub fn with_parsed_key(mut self) -> Option<Self> {
        let parts = parse_session_key(&self.key)?;
        self.agent_id = Some(parts.agent_id);
        self.platform = Some(parts.platform);
        self.recipient = Some(parts.recipient);
        self.is_group = Some(parts.is_group);
        Some(self)
    }
}

// ============================================
// Actions
// ============================================

/// Kind of agent output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Streaming text fragment
    Delta,
    ToolCall,
    ToolResult,
    /// Run finished normally
    Final,
    /// Run failed
    Error,
    /// Run was cancelled
    Aborted,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Delta => "delta",
            ActionType::ToolCall => "tool_call",
            ActionType::ToolResult => "tool_result",
            ActionType::Final => "final",
            ActionType::Error => "error",
            ActionType::Aborted => "aborted",
        }
    }

    /// Terminal types close a run's streaming action.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionType::Final | ActionType::Error | ActionType::Aborted
        )
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delta" => Ok(ActionType::Delta),
            "tool_call" => Ok(ActionType::ToolCall),
            "tool_result" => Ok(ActionType::ToolResult),
            "final" => Ok(ActionType::Final),
            "error" => Ok(ActionType::Error),
            "aborted" => Ok(ActionType::Aborted),
            _ => Err(format!("unknown action type: {}", s)),
        }
    }
}

/// Which kind of frame produced an action. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    Chat,
    Agent,
}

impl EventOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOrigin::Chat => "chat",
            EventOrigin::Agent => "agent",
        }
    }
}

/// One unit of agent output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Table key: `{run_id}-{seq}` or `{run_id}-stream` for streaming actions
    pub id: String,
    /// Groups every action of one agent invocation
    pub run_id: String,
    /// Absent or [`LIFECYCLE_SESSION_KEY`] until resolved
    pub session_key: Option<String>,
    /// Ordering hint from the source, not delivery order
    pub seq: i64,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub event_type: EventOrigin,
    /// Accumulated text for deltas, single payload otherwise
    pub content: Option<String>,
    pub tool_name: Option<String>,
    pub tool_args: Option<serde_json::Value>,
    /// Last-write time
    pub timestamp: DateTime<Utc>,
}

impl Action {
    /// Natural id for a `(run_id, seq)` pair.
    pub fn natural_id(run_id: &str, seq: i64) -> String {
        format!("{}-{}", run_id, seq)
    }

    /// Id of the single streaming record of a run.
    pub fn stream_id(run_id: &str) -> String {
        format!("{}-stream", run_id)
    }

    /// True once the session key names a real session.
    pub fn has_resolved_session(&self) -> bool {
        is_concrete_session_key(self.session_key.as_deref())
    }
}
