//! The wire representation of a live value: a snapshot plus its patches

use crate::{Error, PatchMessage, Result};
use outpost_core::EventStream;
use serde_json::Value as Json;

/// A JSON-like value mirrored across a boundary
///
/// `snapshot` is the value now; `updates` carries the patches that move it
/// forward, addressed relative to this node. Either half may be absent: a
/// constant has no updates, a bare stream has no snapshot.
#[derive(Debug, Clone, Default)]
pub struct WireObject {
    pub snapshot: Option<Json>,
    pub updates: Option<EventStream<PatchMessage>>,
}

impl WireObject {
    /// Create from both halves
    pub fn new(snapshot: Json, updates: EventStream<PatchMessage>) -> Self {
        Self {
            snapshot: Some(snapshot),
            updates: Some(updates),
        }
    }

    /// A value that never changes
    pub fn constant(snapshot: Json) -> Self {
        Self {
            snapshot: Some(snapshot),
            updates: None,
        }
    }

    /// The snapshot, or `MissingSnapshot`
    pub fn snapshot(&self) -> Result<&Json> {
        self.snapshot.as_ref().ok_or(Error::MissingSnapshot)
    }

    /// The patch stream; a stream that never fires when absent
    pub fn updates(&self) -> EventStream<PatchMessage> {
        self.updates.clone().unwrap_or_else(EventStream::never)
    }
}

impl PartialEq for WireObject {
    fn eq(&self, other: &Self) -> bool {
        self.snapshot == other.snapshot && self.updates == other.updates
    }
}
