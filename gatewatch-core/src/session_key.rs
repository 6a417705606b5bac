//! Session key decomposition
//!
//! Gateway session keys look like:
//!
//! ```text
//! agent:<agentId>:<platform>:<kind>:<recipient>     kind = dm | group | channel
//! agent:<agentId>:<platform>:<recipient>            direct conversation
//! ```
//!
//! The recipient is everything after the last structural segment, so it may
//! contain `:` itself (e.g. Matrix room ids). Any other shape is malformed.

use serde::{Deserialize, Serialize};

/// Components of a well-formed session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKeyParts {
    pub agent_id: String,
    pub platform: String,
    pub recipient: String,
    pub is_group: bool,
}

/// Decompose a session key. Returns `None` for malformed keys, never panics.
pub fn parse_session_key(key: &str) -> Option<SessionKeyParts> {
    let rest = key.strip_prefix("agent:")?;
    let (agent_id, rest) = rest.split_once(':')?;
    let (platform, rest) = rest.split_once(':')?;

    let (is_group, recipient) = match rest.split_once(':') {
        Some(("dm", recipient)) => (false, recipient),
        Some(("group" | "channel", recipient)) => (true, recipient),
        _ => (false, rest),
    };

    if agent_id.is_empty() || platform.is_empty() || recipient.is_empty() {
        return None;
    }

    Some(SessionKeyParts {
        agent_id: agent_id.to_string(),
        platform: platform.to_string(),
        recipient: recipient.to_string(),
        is_group,
    })
}
