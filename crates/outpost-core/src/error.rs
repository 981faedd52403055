//! Error types for outpost-core

use thiserror::Error;

/// Misuse of the reactive runtime
///
/// Every variant is a programming error in the code building or tearing down
/// the graph, so none of them is worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Removing a listener that is not registered, or cancelling a
    /// subscription twice
    #[error("invalid subscription: listener is not registered")]
    InvalidSubscription,

    /// A loop placeholder was bound a second time
    #[error("loop is already bound to a source")]
    AlreadyBound,

    /// A loop placeholder was listened to or sampled before being bound
    #[error("loop has not been bound to a source yet")]
    NotYetBound,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
