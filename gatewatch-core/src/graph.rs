//! Graph projector
//!
//! Projects the current sessions and actions into nodes and edges for an
//! external layout/rendering component:
//!
//! ```text
//! origin ──► session-{key} ──► action-{first in run} ──► action-{next} ──► ...
//! ```
//!
//! Pure and idempotent: the same inputs always produce the same graph.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::types::{Action, ActionType, Session};

/// Id of the single root node.
pub const ORIGIN_NODE_ID: &str = "origin";

/// Default number of actions shown when no session is selected.
pub const DEFAULT_RECENT_ACTIONS: usize = 50;

/// Node id for a session.
pub fn session_node_id(key: &str) -> String {
    format!("session-{}", key)
}

/// Node id for an action.
pub fn action_node_id(id: &str) -> String {
    format!("action-{}", id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Origin,
    Session,
    Action,
}

/// Payload carried by a node, opaque to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeData {
    Origin { active: bool },
    Session(Session),
    Action(Action),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub data: NodeData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Set when the target is a still-streaming delta
    pub animated: bool,
}

impl GraphEdge {
    fn new(source: String, target: String, animated: bool) -> Self {
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
            animated,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == source && e.target == target)
    }

    pub fn action_nodes(&self) -> impl Iterator<Item = &GraphNode> + '_ {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Action)
    }

    pub fn session_nodes(&self) -> impl Iterator<Item = &GraphNode> + '_ {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Session)
    }
}

/// Which part of the timeline to project.
#[derive(Debug, Clone, Default)]
pub struct GraphFilter {
    /// Restrict to one session and all of its actions
    pub selected_session: Option<String>,
    /// Window size when nothing is selected
    pub recent_actions: Option<usize>,
}

impl GraphFilter {
    pub fn selecting(key: impl Into<String>) -> Self {
        Self {
            selected_session: Some(key.into()),
            recent_actions: None,
        }
    }
}

/// Build the graph for the given tables.
///
/// Without a selection the window is the newest `recent_actions` actions by
/// `(timestamp, seq)`, ties kept in table order. With a selection, every
/// action of that session is shown.
pub fn project<'a, S, A>(sessions: S, actions: A, filter: &GraphFilter) -> Graph
where
    S: IntoIterator<Item = &'a Session>,
    A: IntoIterator<Item = &'a Action>,
{
    let selected = filter.selected_session.as_deref();

    let all_sessions: Vec<&Session> = sessions.into_iter().collect();
    let visible_sessions: Vec<&Session> = all_sessions
        .iter()
        .copied()
        .filter(|s| selected.map_or(true, |key| s.key == key))
        .collect();

    let visible_actions: Vec<&Action> = match selected {
        Some(key) => actions
            .into_iter()
            .filter(|a| a.session_key.as_deref() == Some(key))
            .collect(),
        None => {
            let mut all: Vec<&Action> = actions.into_iter().collect();
            all.sort_by(|a, b| (a.timestamp, a.seq).cmp(&(b.timestamp, b.seq)));
            let limit = filter.recent_actions.unwrap_or(DEFAULT_RECENT_ACTIONS);
            let skip = all.len().saturating_sub(limit);
            all.split_off(skip)
        }
    };

    let mut graph = Graph::default();
    graph.nodes.push(GraphNode {
        id: ORIGIN_NODE_ID.to_string(),
        kind: NodeKind::Origin,
        data: NodeData::Origin {
            active: !all_sessions.is_empty() || !visible_actions.is_empty(),
        },
    });

    let mut session_nodes = HashSet::new();
    for session in &visible_sessions {
        let node_id = session_node_id(&session.key);
        graph.edges.push(GraphEdge::new(
            ORIGIN_NODE_ID.to_string(),
            node_id.clone(),
            false,
        ));
        session_nodes.insert(node_id.clone());
        graph.nodes.push(GraphNode {
            id: node_id,
            kind: NodeKind::Session,
            data: NodeData::Session((*session).clone()),
        });
    }

    for action in &visible_actions {
        graph.nodes.push(GraphNode {
            id: action_node_id(&action.id),
            kind: NodeKind::Action,
            data: NodeData::Action((*action).clone()),
        });
    }

    // Group by run, keeping first-appearance order of runs for stable output.
    let mut run_order: Vec<&str> = Vec::new();
    let mut runs: HashMap<&str, Vec<&Action>> = HashMap::new();
    for &action in &visible_actions {
        runs.entry(action.run_id.as_str())
            .or_insert_with(|| {
                run_order.push(action.run_id.as_str());
                Vec::new()
            })
            .push(action);
    }

    for run_id in run_order {
        let Some(mut group) = runs.remove(run_id) else {
            continue;
        };
        group.sort_by_key(|a| a.seq);

        let first = group[0];
        match first.session_key.as_deref().map(session_node_id) {
            Some(session_node) if session_nodes.contains(&session_node) => {
                graph.edges.push(GraphEdge::new(
                    session_node,
                    action_node_id(&first.id),
                    false,
                ));
            }
            _ => {
                tracing::debug!(
                    run_id = %run_id,
                    session_key = ?first.session_key,
                    "Session node not visible, skipping session edge"
                );
            }
        }

        for pair in group.windows(2) {
            graph.edges.push(GraphEdge::new(
                action_node_id(&pair[0].id),
                action_node_id(&pair[1].id),
                pair[1].action_type == ActionType::Delta,
            ));
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventOrigin, SessionStatus};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn session(key: &str) -> Session {
        Session {
            status: SessionStatus::Active,
            ..Session::new(key, ts(0))
        }
    }

    fn action(id: &str, run_id: &str, seq: i64, ty: ActionType, key: Option<&str>) -> Action {
        Action {
            id: id.to_string(),
            run_id: run_id.to_string(),
            session_key: key.map(str::to_string),
            seq,
            action_type: ty,
            event_type: EventOrigin::Chat,
            content: None,
            tool_name: None,
            tool_args: None,
            timestamp: ts(seq),
        }
    }

    #[test]
    fn test_empty_store_has_inactive_origin() {
        let graph = project(&Vec::<Session>::new(), &Vec::<Action>::new(), &GraphFilter::default());
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.edges.is_empty());
        assert_eq!(
            graph.node(ORIGIN_NODE_ID).unwrap().data,
            NodeData::Origin { active: false }
        );
    }

    #[test]
    fn test_run_chain_and_session_edge() {
        let sessions = vec![session("A")];
        let actions = vec![
            action("r1-stream", "r1", 5, ActionType::Delta, Some("A")),
            action("r1-2", "r1", 2, ActionType::ToolCall, Some("A")),
            action("r1-3", "r1", 3, ActionType::ToolResult, Some("A")),
        ];

        let graph = project(&sessions, &actions, &GraphFilter::default());

        assert_eq!(graph.nodes.len(), 5);
        assert!(graph.has_edge(ORIGIN_NODE_ID, "session-A"));
        assert!(graph.has_edge("session-A", "action-r1-2"));
        assert!(graph.has_edge("action-r1-2", "action-r1-3"));
        assert!(graph.has_edge("action-r1-3", "action-r1-stream"));
        assert_eq!(graph.edges.len(), 4);

        let animated: Vec<_> = graph.edges.iter().filter(|e| e.animated).collect();
        assert_eq!(animated.len(), 1);
        assert_eq!(animated[0].target, "action-r1-stream");
        assert_eq!(
            graph.node(ORIGIN_NODE_ID).unwrap().data,
            NodeData::Origin { active: true }
        );
    }

    #[test]
    fn test_selection_filters_sessions_and_actions() {
        let sessions = vec![session("A"), session("B")];
        let actions = vec![
            action("r1-1", "r1", 1, ActionType::ToolCall, Some("B")),
            action("r1-2", "r1", 2, ActionType::ToolResult, Some("B")),
            action("r2-1", "r2", 1, ActionType::ToolCall, Some("A")),
        ];

        let graph = project(&sessions, &actions, &GraphFilter::selecting("A"));

        assert_eq!(graph.session_nodes().count(), 1);
        assert!(graph.node("session-A").is_some());
        assert!(graph.node("session-B").is_none());
        assert_eq!(graph.action_nodes().count(), 1);
        assert!(!graph.has_edge("session-B", "action-r1-1"));
        assert!(graph.has_edge("session-A", "action-r2-1"));
    }

    #[test]
    fn test_edge_skipped_when_first_action_session_not_visible() {
        // Run r1 started on B; its later action was re-keyed to A.
        let sessions = vec![session("A"), session("B")];
        let actions = vec![
            action("r1-1", "r1", 1, ActionType::ToolCall, Some("B")),
            action("r1-stream", "r1", 2, ActionType::Delta, Some("A")),
        ];

        let graph = project(&sessions, &actions, &GraphFilter::selecting("A"));

        // The A-keyed action is visible, but its run's first visible action is
        // itself, so it links to A; nothing links from B.
        assert!(graph.node("action-r1-stream").is_some());
        assert!(graph.node("action-r1-1").is_none());
        assert!(!graph.edges.iter().any(|e| e.source == "session-B"));
        assert!(graph.has_edge("session-A", "action-r1-stream"));
    }

    #[test]
    fn test_selected_session_missing_from_table() {
        crate::logging::init_test();

        // The selected session was never upserted, but its actions exist.
        let sessions = vec![session("B")];
        let actions = vec![
            action("r1-1", "r1", 1, ActionType::ToolCall, Some("A")),
            action("r1-2", "r1", 2, ActionType::ToolResult, Some("A")),
        ];

        let graph = project(&sessions, &actions, &GraphFilter::selecting("A"));

        assert_eq!(graph.session_nodes().count(), 0);
        assert_eq!(graph.action_nodes().count(), 2);
        assert!(!graph.edges.iter().any(|e| e.target == "action-r1-1"));
        assert!(graph.has_edge("action-r1-1", "action-r1-2"));
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_origin_active_when_selection_matches_nothing() {
        let sessions = vec![session("agent:main:telegram:dm:1")];
        let actions: Vec<Action> = vec![];

        let graph = project(&sessions, &actions, &GraphFilter::selecting("agent:x:y:dm:z"));

        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(
            graph.node(ORIGIN_NODE_ID).unwrap().data,
            NodeData::Origin { active: true }
        );
    }

    #[test]
    fn test_recent_window_mixes_clocks_by_timestamp() {
        // Chat actions carry receipt time, agent actions the gateway's ts.
        let mut chat = action("r1-stream", "r1", 1, ActionType::Delta, None);
        chat.timestamp = ts(100);
        let mut agent_old = action("r2-4", "r2", 4, ActionType::ToolCall, None);
        agent_old.event_type = EventOrigin::Agent;
        agent_old.timestamp = ts(50);
        let mut agent_tie = action("r3-1", "r3", 1, ActionType::ToolCall, None);
        agent_tie.event_type = EventOrigin::Agent;
        agent_tie.timestamp = ts(100);

        // Arrival order: agent_old, agent_tie, chat.
        let actions = vec![agent_old, agent_tie, chat];
        let filter = GraphFilter {
            selected_session: None,
            recent_actions: Some(2),
        };
        let graph = project(&Vec::<Session>::new(), &actions, &filter);

        // Equal (timestamp, seq) keeps arrival order.
        let ids: Vec<_> = graph.action_nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["action-r3-1", "action-r1-stream"]);
    }

    #[test]
    fn test_edge_skipped_for_unknown_or_unresolved_session() {
        crate::logging::init_test();

        let sessions = vec![session("A")];
        let actions = vec![
            action("r1-1", "r1", 1, ActionType::ToolCall, Some("B")),
            action("r2-stream", "r2", 1, ActionType::Delta, Some("lifecycle")),
            action("r3-1", "r3", 1, ActionType::Error, None),
        ];

        let graph = project(&sessions, &actions, &GraphFilter::default());

        assert_eq!(graph.action_nodes().count(), 3);
        // Only origin -> session-A.
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_recent_window_uses_time_order() {
        let sessions: Vec<Session> = vec![];
        // Table order deliberately differs from time order.
        let actions = vec![
            action("r3-1", "r3", 30, ActionType::ToolCall, None),
            action("r1-1", "r1", 10, ActionType::ToolCall, None),
            action("r2-1", "r2", 20, ActionType::ToolCall, None),
        ];

        let filter = GraphFilter {
            selected_session: None,
            recent_actions: Some(2),
        };
        let graph = project(&sessions, &actions, &filter);

        let ids: Vec<_> = graph.action_nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["action-r2-1", "action-r3-1"]);
    }

    #[test]
    fn test_default_window_is_fifty() {
        let actions: Vec<Action> = (0..60)
            .map(|i| action(&format!("r{i}-1"), &format!("r{i}"), i, ActionType::ToolCall, None))
            .collect();
        let graph = project(&Vec::<Session>::new(), &actions, &GraphFilter::default());
        assert_eq!(graph.action_nodes().count(), DEFAULT_RECENT_ACTIONS);
        assert!(graph.node("action-r0-1").is_none());
        assert!(graph.node("action-r59-1").is_some());
    }

    #[test]
    fn test_projection_is_idempotent() {
        let sessions = vec![session("A")];
        let actions = vec![
            action("r1-1", "r1", 1, ActionType::ToolCall, Some("A")),
            action("r1-stream", "r1", 2, ActionType::Delta, Some("A")),
        ];
        let first = project(&sessions, &actions, &GraphFilter::default());
        let second = project(&sessions, &actions, &GraphFilter::default());
        assert_eq!(first, second);
    }
}
