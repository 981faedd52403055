//! Serializer: live cells, streams and collections into wire objects
//!
//! Every `dump_*` function is lazy in the same way the graph is: the patch
//! stream it returns only subscribes to its sources once somebody listens.

use crate::{PatchMessage, Result, WireObject};
use indexmap::IndexMap;
use outpost_core::{Cell, EventStream, ReactiveCollection};
use serde::Serialize;
use serde_json::{Map, Value as Json};

fn encode<A: Serialize>(value: &A) -> Option<Json> {
    match serde_json::to_value(value) {
        Ok(json) => Some(json),
        Err(err) => {
            tracing::warn!(%err, "dropping value that does not encode to JSON");
            None
        }
    }
}

/// A constant
pub fn dump_value<A: Serialize>(value: &A) -> Result<WireObject> {
    Ok(WireObject::constant(serde_json::to_value(value)?))
}

/// A bare stream: no snapshot, every occurrence replaces the value
pub fn dump_stream<A: Serialize + Clone + 'static>(stream: &EventStream<A>) -> WireObject {
    WireObject {
        snapshot: None,
        updates: Some(
            stream.filter_map(|a| encode(a).map(PatchMessage::replace)),
        ),
    }
}

/// A cell: its value now, then a replacement per change
pub fn dump_cell<A: Serialize + Clone + 'static>(cell: &Cell<A>) -> Result<WireObject> {
    Ok(WireObject {
        snapshot: Some(serde_json::to_value(cell.value())?),
        updates: dump_stream(&cell.updates()).updates,
    })
}

/// A fixed set of named children
///
/// The snapshot maps each key to its child's snapshot (children without a
/// snapshot are left out); child patches are re-addressed under their key.
pub fn dump_object(children: IndexMap<String, WireObject>) -> WireObject {
    let mut snapshot = Map::new();
    let mut updates = Vec::new();
    for (key, child) in children {
        if let Some(updates_of_child) = &child.updates {
            let prefix = key.clone();
            updates.push(updates_of_child.map(move |patch| patch.prefixed(&prefix)));
        }
        if let Some(child_snapshot) = child.snapshot {
            snapshot.insert(key, child_snapshot);
        }
    }
    WireObject::new(Json::Object(snapshot), EventStream::merge_set(updates))
}

/// A nested object that can be swapped wholesale
///
/// Each swap is sent as a replacement of the whole node, followed by the
/// patches of whichever inner object is current. Patches of an inner object
/// stop as soon as it is swapped out.
pub fn dump_object_cell(cell: &Cell<WireObject>) -> WireObject {
    let replacements = cell
        .updates()
        .filter_map(|object: &WireObject| object.snapshot.clone().map(PatchMessage::replace));
    let inner = cell.switch_map_s(WireObject::updates);
    WireObject {
        snapshot: cell.value().snapshot,
        updates: Some(replacements.merge(&inner)),
    }
}

/// A collection of elements addressed by caller-supplied stable ids
///
/// Serialized as an object keyed by id. A membership change replaces the
/// whole object; a change inside an element is a patch under its id.
pub fn dump_collection(collection: &ReactiveCollection<(String, WireObject)>) -> WireObject {
    let objects = collection
        .as_cell()
        .map(|entries| dump_object(entries.iter().cloned().collect()));
    dump_object_cell(&objects)
}
