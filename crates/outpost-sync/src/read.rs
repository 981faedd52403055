//! Deserializer: inbound wire objects back into cells and collections
//!
//! Reads are tolerant per subtree: a message that cannot be decoded where it
//! lands is logged and dropped, and the rest of the graph stays live.
//!
//! Cells built here hold their last value, so they only follow the feed while
//! active. Retain them (see [`outpost_core::Cell::retain`]) when nobody else
//! is listening.

use crate::{Error, PatchMessage, Result, WireObject};
use outpost_core::{Cell, EventStream, ReactiveCollection};
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use std::cell::Cell as StdCell;
use std::fmt;
use std::rc::Rc;

fn decode<A: DeserializeOwned>(data: &Json) -> Result<A> {
    Ok(serde_json::from_value(data.clone())?)
}

/// The current snapshot, decoded
pub fn read_value<A: DeserializeOwned>(object: &WireObject) -> Result<A> {
    decode(object.snapshot()?)
}

/// Whole-value replacements, decoded
///
/// A patch with a non-empty path cannot address anything inside a leaf and
/// is dropped.
pub fn read_stream<A: DeserializeOwned + Clone + 'static>(object: &WireObject) -> EventStream<A> {
    object.updates().filter_map(|patch: &PatchMessage| {
        if !patch.is_replacement() {
            let err = Error::MalformedMessage(format!("leaf patched at {:?}", patch.path));
            tracing::warn!(%err, "dropping patch");
            return None;
        }
        match decode(&patch.data) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%err, "dropping undecodable value");
                None
            }
        }
    })
}

/// A leaf cell: the snapshot, then every replacement
pub fn read_cell<A: DeserializeOwned + Clone + 'static>(object: &WireObject) -> Result<Cell<A>> {
    let initial = read_value(object)?;
    Ok(read_stream(object).hold(initial))
}

/// The child under `key`, with its patches re-addressed relative to it
pub fn read_object_property(object: &WireObject, key: &str) -> Result<WireObject> {
    let snapshot = match &object.snapshot {
        Some(snapshot) => Some(
            snapshot
                .get(key)
                .cloned()
                .ok_or_else(|| Error::PathNotFound {
                    path: vec![key.to_string()],
                })?,
        ),
        None => None,
    };
    let key = key.to_string();
    let updates = object
        .updates()
        .filter_map(move |patch: &PatchMessage| patch.strip_prefix(&key));
    Ok(WireObject {
        snapshot,
        updates: Some(updates),
    })
}

/// A nested object that can be swapped wholesale, decoded with `decode`
///
/// A patch with an empty path replaces the whole nested object: a fresh
/// inner wire object is built from its data and decoded, and the previous
/// inner object receives nothing from then on. Longer patches go to the
/// inner object that is current. A replacement that fails to decode is
/// dropped and the previous object stays current.
///
/// `decode` may fail with any error that can carry this crate's errors, so
/// callers can report their own variants.
pub fn read_object_cell<A, E, F>(object: &WireObject, decode: F) -> std::result::Result<Cell<A>, E>
where
    A: Clone + 'static,
    E: From<Error> + fmt::Display + 'static,
    F: Fn(&WireObject) -> std::result::Result<A, E> + 'static,
{
    let generation = Rc::new(StdCell::new(0_u64));
    let patches = object
        .updates()
        .filter(|patch: &PatchMessage| !patch.is_replacement());
    let inner_at = {
        let generation = Rc::clone(&generation);
        move |snapshot: Json, current: u64| {
            let generation = Rc::clone(&generation);
            WireObject::new(
                snapshot,
                patches.filter(move |_| generation.get() == current),
            )
        }
    };

    let initial = decode(&inner_at(object.snapshot()?.clone(), 0))?;
    let replacements = object.updates().filter_map(move |patch: &PatchMessage| {
        if !patch.is_replacement() {
            return None;
        }
        let next = generation.get() + 1;
        match decode(&inner_at(patch.data.clone(), next)) {
            Ok(value) => {
                generation.set(next);
                Some(value)
            }
            Err(err) => {
                tracing::warn!(%err, "dropping undecodable replacement");
                None
            }
        }
    });
    Ok(replacements.hold(initial))
}

/// A keyed collection, each element decoded with `decode`
///
/// Membership follows the key set of the current snapshot. Elements that
/// fail to decode are logged and left out.
pub fn read_collection<A, E, F>(
    object: &WireObject,
    decode: F,
) -> std::result::Result<ReactiveCollection<A>, E>
where
    A: Clone + 'static,
    E: From<Error> + fmt::Display + 'static,
    F: Fn(&str, &WireObject) -> std::result::Result<A, E> + 'static,
{
    let members = read_object_cell(object, move |current: &WireObject| {
        let keys: Vec<String> = match current.snapshot()? {
            Json::Object(entries) => entries.keys().cloned().collect(),
            other => {
                return Err(E::from(Error::MalformedMessage(format!(
                    "collection snapshot is not an object: {other}"
                ))))
            }
        };
        let mut members = Vec::with_capacity(keys.len());
        for id in keys {
            let element = read_object_property(current, &id)?;
            match decode(&id, &element) {
                Ok(member) => members.push(member),
                Err(err) => tracing::warn!(%err, %id, "dropping undecodable element"),
            }
        }
        Ok(Rc::new(members))
    })?;
    Ok(ReactiveCollection::from_cell(members))
}
