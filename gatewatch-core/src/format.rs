//! Text rendering helpers for list views and the CLI.

use chrono::{DateTime, Utc};

use crate::types::{Action, ActionType, Session};

/// Format how long ago `ts` was relative to `now` (e.g., "2m ago").
pub fn format_age(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(ts).num_seconds();

    match secs {
        s if s < 5 => "just now".to_string(),
        s if s < 60 => format!("{}s ago", s),
        s if s < 3600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3600),
        s => format!("{}d ago", s / 86_400),
    }
}

/// Shorten text to `max` characters, collapsing whitespace runs.
pub fn truncate(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut)
}

/// One-line description of an action.
pub fn action_line(action: &Action) -> String {
    let session = action.session_key.as_deref().unwrap_or("-");
    let body = match action.action_type {
        ActionType::ToolCall => {
            let args = action
                .tool_args
                .as_ref()
                .map(|a| truncate(&a.to_string(), 60))
                .unwrap_or_default();
            format!("{}({})", action.tool_name.as_deref().unwrap_or("?"), args)
        }
        _ => truncate(action.content.as_deref().unwrap_or(""), 80),
    };
    format!(
        "[{:<11}] {} {} {}",
        action.action_type.as_str(),
        action.run_id,
        session,
        body
    )
}

/// One-line description of a session.
pub fn session_line(session: &Session, now: DateTime<Utc>) -> String {
    format!(
        "{:<8} {} ({})",
        session.status.as_str(),
        session.label(),
        format_age(session.last_activity_at, now)
    )
}
