//! Error types for the relay crate

use thiserror::Error;

/// Errors produced by the streaming client and relay pipeline
#[derive(Error, Debug)]
pub enum ChatError {
    /// The provider connection failed or terminated uncleanly.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A single stream event could not be decoded.
    #[error("failed to decode stream event: {0}")]
    Decode(#[source] serde_json::Error),

    /// The downstream client went away mid-stream.
    #[error("client disconnected: {0}")]
    Disconnected(String),

    #[error("invalid message role: {0}")]
    InvalidRole(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, ChatError>;
