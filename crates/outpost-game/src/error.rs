//! Error types for outpost-game

use thiserror::Error;

/// Game error type
#[derive(Debug, Error)]
pub enum Error {
    /// A discriminant with no matching variant (building kind, state tag,
    /// sign-in status)
    #[error("Unrecognized {what}: {value}")]
    UnrecognizedVariant { what: &'static str, value: String },

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error in a command body
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wire protocol error
    #[error("Sync error: {0}")]
    Sync(#[from] outpost_sync::Error),

    /// Reactive runtime misuse
    #[error("Core error: {0}")]
    Core(#[from] outpost_core::Error),
}

impl Error {
    pub(crate) fn unrecognized(what: &'static str, value: impl Into<String>) -> Self {
        Error::UnrecognizedVariant {
            what,
            value: value.into(),
        }
    }
}

/// Result type for game operations
pub type Result<T> = std::result::Result<T, Error>;
