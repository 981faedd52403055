//! Error types for outpost-sync

use thiserror::Error;

/// Synchronization error type
#[derive(Debug, Error)]
pub enum Error {
    /// A patch path does not resolve within the current snapshot
    #[error("Path {path:?} not found in snapshot")]
    PathNotFound { path: Vec<String> },

    /// A message that does not fit the node it was delivered to
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A wire object or feed that carries no snapshot
    #[error("No snapshot available")]
    MissingSnapshot,

    /// Frames were skipped between the last applied one and this one
    #[error("Sequence gap: expected frame {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reactive runtime misuse
    #[error("Core error: {0}")]
    Core(#[from] outpost_core::Error),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, Error>;
