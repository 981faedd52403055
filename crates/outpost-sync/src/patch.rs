//! Path-addressed patches over a JSON document

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// One in-place update of a snapshot
///
/// Applying `[k1, ..., kn]` descends `k1..k(n-1)` and replaces field `kn`
/// with `data`; an empty path replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchMessage {
    pub path: Vec<String>,
    pub data: Json,
}

impl PatchMessage {
    /// Create a patch at `path`
    pub fn new(path: Vec<String>, data: Json) -> Self {
        Self { path, data }
    }

    /// Create a whole-value replacement
    pub fn replace(data: Json) -> Self {
        Self {
            path: Vec::new(),
            data,
        }
    }

    /// Check whether this replaces the whole value at its node
    pub fn is_replacement(&self) -> bool {
        self.path.is_empty()
    }

    /// The same patch seen from the parent object, under `key`
    pub fn prefixed(&self, key: &str) -> Self {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.push(key.to_string());
        path.extend(self.path.iter().cloned());
        Self {
            path,
            data: self.data.clone(),
        }
    }

    /// The same patch seen from the child under `key`, if it is addressed there
    pub fn strip_prefix(&self, key: &str) -> Option<Self> {
        match self.path.split_first() {
            Some((first, rest)) if first == key => Some(Self {
                path: rest.to_vec(),
                data: self.data.clone(),
            }),
            _ => None,
        }
    }
}

/// Apply `patch` to `target` in place
///
/// Fails with `PathNotFound` when an intermediate key is missing or a step
/// of the path is not an object. `target` is left untouched on failure.
pub fn apply_patch(target: &mut Json, patch: &PatchMessage) -> Result<()> {
    let Some((last, parents)) = patch.path.split_last() else {
        *target = patch.data.clone();
        return Ok(());
    };

    let not_found = || Error::PathNotFound {
        path: patch.path.clone(),
    };
    let mut node = target;
    for key in parents {
        node = node
            .as_object_mut()
            .and_then(|object| object.get_mut(key))
            .ok_or_else(not_found)?;
    }
    let object = node.as_object_mut().ok_or_else(not_found)?;
    object.insert(last.clone(), patch.data.clone());
    Ok(())
}
