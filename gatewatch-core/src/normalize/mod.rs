//! Event normalizer
//!
//! Translates gateway frames into canonical partial records: a [`SessionPatch`]
//! and/or an [`Action`]. Pure functions, no store access.
//!
//! ## Recognized frames
//!
//! | `event` | Produces |
//! |---------|----------|
//! | `chat`  | Action (`{runId}-{seq}`) + session patch when the key decomposes |
//! | `agent` | Action from a typed payload, or a [`RunPhase`] on the lifecycle stream |
//!
//! Anything else, or a recognized frame with an unusable payload, yields
//! `None`. Bad frames are dropped, never fatal.

mod frame;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Action, ActionType, EventOrigin, SessionPatch, SessionStatus};
use frame::{
    tool_result_text, AgentBlock, AgentData, AgentPayload, ChatPayload, ChatState, ContentBlock,
    MessageContent, RawFrame,
};

/// Lifecycle phase of a run, reported on the agent lifecycle stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Start,
    End,
    Error,
}

impl std::str::FromStr for RunPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(RunPhase::Start),
            "end" => Ok(RunPhase::End),
            "error" => Ok(RunPhase::Error),
            _ => Err(format!("unknown run phase: {}", s)),
        }
    }
}

/// A run changed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPhaseEvent {
    pub run_id: String,
    pub phase: RunPhase,
}

/// Output of normalizing one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub session: Option<SessionPatch>,
    pub action: Option<Action>,
    pub run_phase: Option<RunPhaseEvent>,
}

impl Normalized {
    fn is_empty(&self) -> bool {
        self.session.is_none() && self.action.is_none() && self.run_phase.is_none()
    }
}

/// Normalize a frame, stamping session activity with the current time.
pub fn normalize_frame(frame: &serde_json::Value) -> Option<Normalized> {
    normalize_frame_at(frame, Utc::now())
}

/// Normalize a frame with an explicit "now".
pub fn normalize_frame_at(frame: &serde_json::Value, now: DateTime<Utc>) -> Option<Normalized> {
    let raw: RawFrame = match serde_json::from_value(frame.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping frame with invalid envelope");
            return None;
        }
    };

    if matches!(raw.frame_type.as_deref(), Some(t) if t != "event") {
        tracing::trace!(frame_type = ?raw.frame_type, "Ignoring non-event frame");
        return None;
    }

    let payload = raw.payload?;
    let normalized = match raw.event.as_deref() {
        Some("chat") => normalize_chat(payload, now),
        Some("agent") => normalize_agent(payload, now),
        other => {
            tracing::debug!(event = ?other, "Dropping frame with unknown event");
            None
        }
    }?;

    (!normalized.is_empty()).then_some(normalized)
}

fn normalize_chat(payload: serde_json::Value, now: DateTime<Utc>) -> Option<Normalized> {
    let chat: ChatPayload = match serde_json::from_value(payload) {
        Ok(chat) => chat,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed chat frame");
            return None;
        }
    };

    let mut action_type = match chat.state {
        ChatState::Delta => ActionType::Delta,
        ChatState::Final => ActionType::Final,
        ChatState::Error => ActionType::Error,
        ChatState::Aborted => ActionType::Aborted,
    };

    let mut text = String::new();
    let mut tool_name = None;
    let mut tool_args = None;

    match chat.message.as_ref().and_then(|m| m.content()) {
        Some(MessageContent::Text(s)) => text = s,
        Some(MessageContent::Blocks(blocks)) => {
            for block in blocks {
                match block {
                    ContentBlock::Text { text: t } => text.push_str(&t),
                    ContentBlock::ToolUse { name, input } => {
                        action_type = ActionType::ToolCall;
                        tool_name = name;
                        tool_args = input;
                    }
                    ContentBlock::ToolResult { content } => {
                        action_type = ActionType::ToolResult;
                        if let Some(result) = content.as_ref().and_then(tool_result_text) {
                            text.push_str(&result);
                        }
                    }
                    ContentBlock::Unknown => {}
                }
            }
        }
        None => {}
    }

    // An explicit error message wins over any parsed text.
    let content = match chat.error_message {
        Some(error) => Some(error),
        None => (!text.is_empty()).then_some(text),
    };

    let session = chat.session_key.as_ref().and_then(|key| {
        let status = if chat.state == ChatState::Delta {
            SessionStatus::Thinking
        } else {
            SessionStatus::Active
        };
        let patch = SessionPatch::new(key.clone())
            .with_status(status)
            .with_last_activity(now)
            .with_parsed_key();
        if patch.is_none() {
            tracing::debug!(session_key = %key, "Chat frame session key does not decompose");
        }
        patch
    });

    let action = Action {
        id: Action::natural_id(&chat.run_id, chat.seq),
        run_id: chat.run_id,
        session_key: chat.session_key,
        seq: chat.seq,
        action_type,
        event_type: EventOrigin::Chat,
        content,
        tool_name,
        tool_args,
        timestamp: now,
    };

    Some(Normalized {
        session,
        action: Some(action),
        run_phase: None,
    })
}

fn normalize_agent(payload: serde_json::Value, now: DateTime<Utc>) -> Option<Normalized> {
    let agent: AgentPayload = match serde_json::from_value(payload) {
        Ok(agent) => agent,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed agent frame");
            return None;
        }
    };

    let timestamp = agent
        .ts
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(now);

    let (action_type, content, tool_name, tool_args) = match agent.data? {
        AgentData::Block(AgentBlock::ToolUse { name, input }) => {
            (ActionType::ToolCall, None, name, input)
        }
        AgentData::Block(AgentBlock::ToolResult { content }) => (
            ActionType::ToolResult,
            content.as_ref().and_then(tool_result_text),
            None,
            None,
        ),
        AgentData::Block(AgentBlock::Text { text }) => (ActionType::Delta, Some(text), None, None),
        AgentData::Phase { phase } => {
            let phase = match phase.parse::<RunPhase>() {
                Ok(phase) => phase,
                Err(e) => {
                    tracing::debug!(run_id = %agent.run_id, error = %e, "Ignoring run phase");
                    return None;
                }
            };
            return Some(Normalized {
                run_phase: Some(RunPhaseEvent {
                    run_id: agent.run_id,
                    phase,
                }),
                ..Default::default()
            });
        }
        AgentData::Block(AgentBlock::Unknown) | AgentData::Other(_) => {
            tracing::trace!(run_id = %agent.run_id, "Agent frame carries no recognized payload");
            return None;
        }
    };

    let action = Action {
        id: Action::natural_id(&agent.run_id, agent.seq),
        run_id: agent.run_id,
        session_key: agent.stream,
        seq: agent.seq,
        action_type,
        event_type: EventOrigin::Agent,
        content,
        tool_name,
        tool_args,
        timestamp,
    };

    Some(Normalized {
        session: None,
        action: Some(action),
        run_phase: None,
    })
}
