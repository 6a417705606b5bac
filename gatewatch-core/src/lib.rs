//! # gatewatch-core
//!
//! Core library for gatewatch - a live activity monitor for a conversational
//! agent gateway serving several messaging platforms.
//!
//! This library provides:
//! - Domain types for sessions and actions
//! - The event normalizer turning gateway frames into canonical records
//! - The in-memory activity store with streaming aggregation
//! - The graph projector feeding an external renderer
//! - The ingest runtime (websocket transport, snapshot poll, single-writer actor)
//! - Configuration and logging
//!
//! ## Architecture
//!
//! Data flows one way:
//!
//! ```text
//! gateway frames ─► normalize ─► ActivityStore ─► graph::project ─► renderer
//!                                      └────────────► list views
//! ```
//!
//! ## Example
//!
//! ```rust
//! use gatewatch_core::{normalize_frame, project, ActivityStore, GraphFilter};
//! use serde_json::json;
//!
//! let mut store = ActivityStore::new();
//! let frame = json!({
//!     "type": "event",
//!     "event": "chat",
//!     "payload": {
//!         "runId": "r1",
//!         "sessionKey": "agent:main:telegram:dm:42",
//!         "seq": 1,
//!         "state": "delta",
//!         "message": {"content": "Hello"}
//!     }
//! });
//!
//! if let Some(normalized) = normalize_frame(&frame) {
//!     if let Some(session) = normalized.session {
//!         store.upsert_session(session);
//!     }
//!     if let Some(action) = normalized.action {
//!         store.add_action(action);
//!     }
//! }
//!
//! let graph = project(store.sessions(), store.actions(), &GraphFilter::default());
//! assert_eq!(graph.nodes.len(), 3);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use graph::{project, Graph, GraphEdge, GraphFilter, GraphNode};
pub use normalize::{normalize_frame, Normalized, RunPhase};
pub use session_key::{parse_session_key, SessionKeyParts};
pub use store::{ActivityStore, AddOutcome};
pub use types::*;

// Public modules
pub mod config;
pub mod error;
pub mod format;
pub mod graph;
pub mod logging;
pub mod normalize;
pub mod runtime;
pub mod session_key;
pub mod store;
pub mod types;
