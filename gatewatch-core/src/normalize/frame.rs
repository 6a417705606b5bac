//! Wire types for gateway frames (serde deserialization)
//!
//! Every field is optional or defaulted so a partially-populated frame still
//! deserializes; the normalizer decides what is usable. Loosely-typed payload
//! shapes are resolved here, once, into sum types.

use serde::{Deserialize, Deserializer};

/// Outer envelope: `{"type": "event", "event": "chat" | "agent", "payload": {...}}`
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawFrame {
    #[serde(rename = "type")]
    pub frame_type: Option<String>,
    pub event: Option<String>,
    pub payload: Option<serde_json::Value>,
}

// ============================================
// Chat frames
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatPayload {
    pub run_id: String,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub seq: i64,
    pub state: ChatState,
    #[serde(default)]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ChatState {
    Delta,
    Final,
    Error,
    Aborted,
}

/// The message is either bare text or an object carrying content.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ChatMessage {
    Text(String),
    Structured {
        #[serde(default)]
        content: Option<MessageContent>,
    },
}

impl ChatMessage {
    pub fn content(&self) -> Option<MessageContent> {
        match self {
            ChatMessage::Text(text) => Some(MessageContent::Text(text.clone())),
            ChatMessage::Structured { content } => content.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum MessageContent {
    Text(String),
    Blocks(#[serde(deserialize_with = "lenient_blocks")] Vec<ContentBlock>),
}

/// Unusable blocks become [`ContentBlock::Unknown`] instead of failing the list.
fn lenient_blocks<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|block| serde_json::from_value(block).unwrap_or(ContentBlock::Unknown))
        .collect())
}

/// `null` reads as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentBlock {
    Text {
        #[serde(default, deserialize_with = "null_as_default")]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    ToolResult {
        #[serde(default)]
        content: Option<serde_json::Value>,
    },
    #[serde(other)]
    Unknown,
}

// ============================================
// Agent-internal frames
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AgentPayload {
    pub run_id: String,
    #[serde(default)]
    pub seq: i64,
    #[serde(default)]
    pub stream: Option<String>,
    /// Epoch milliseconds
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub data: Option<AgentData>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum AgentData {
    Block(AgentBlock),
    Phase { phase: String },
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AgentBlock {
    ToolUse {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    ToolResult {
        #[serde(default)]
        content: Option<serde_json::Value>,
    },
    Text {
        #[serde(default, deserialize_with = "null_as_default")]
        text: String,
    },
    #[serde(other)]
    Unknown,
}

/// Flatten a tool result payload into text.
///
/// Strings pass through, lists of text blocks are joined, anything else is
/// rendered as compact JSON.
pub(crate) fn tool_result_text(content: &serde_json::Value) -> Option<String> {
    match content {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let text: String = items
                .iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(s) => Some(s.as_str()),
                    serde_json::Value::Object(map) => map.get("text").and_then(|t| t.as_str()),
                    _ => None,
                })
                .collect();
            Some(text)
        }
        other => Some(other.to_string()),
    }
}
