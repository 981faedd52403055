//! Outpost Sync - Mirror a reactive graph across a process boundary
//!
//! A live value is projected as a [`WireObject`]: a JSON snapshot plus a
//! stream of path-addressed [`PatchMessage`]s. This crate provides:
//! - Patch application over a JSON document (`apply_patch`)
//! - The serializer, from cells and collections to wire objects (`dump`)
//! - The deserializer, from wire objects back to cells and collections (`read`)
//! - A sequenced feed with gap detection and periodic resync (`feed`)
//! - Transport traits for carrying encoded frames (`transport`)
//!
//! ## Protocol
//!
//! A patch with path `[k1, ..., kn]` descends `k1..k(n-1)` in the current
//! snapshot and replaces field `kn`; an empty path replaces the whole value
//! at the node that receives it. Nested objects that can be swapped
//! wholesale use the empty path for "replace" and longer paths for "patch
//! inside the current one".

pub mod dump;
mod error;
pub mod feed;
mod object;
mod patch;
pub mod read;
pub mod transport;

pub use dump::{dump_cell, dump_collection, dump_object, dump_object_cell, dump_stream, dump_value};
pub use error::{Error, Result};
pub use feed::{FeedConfig, FeedFrame, FeedPublisher, FeedReceiver};
pub use object::WireObject;
pub use patch::{apply_patch, PatchMessage};
pub use read::{
    read_cell, read_collection, read_object_cell, read_object_property, read_stream, read_value,
};
pub use transport::{FrameSink, FrameSource};
