//! Error types for gatewatch-core
//!
//! The ingestion core (normalizer, store, projector) absorbs bad input instead
//! of failing. These errors only surface at the edges: configuration, logging
//! setup, and the transport/poll collaborators.

use thiserror::Error;

/// Main error type for the gatewatch-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Websocket transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Session snapshot poll error
    #[error("poll error: {0}")]
    Poll(String),
}

/// Result type alias for gatewatch-core
pub type Result<T> = std::result::Result<T, Error>;
