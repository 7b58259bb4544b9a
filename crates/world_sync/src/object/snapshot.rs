//! Serializable, self-contained image of an object tree.
//!
//! The same shape is used for FULL sync frames, for objects inside DELTA
//! `added` entries, and (without events) for persistence.

use crate::types::LocalId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ephemeral `(name, payload)` notification attached to an object for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub payload: String,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// Recursive `{identity, attributes, slots}` image of an object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LocalId>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<SlotSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
}

/// One named slot with its children in order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub name: String,
    #[serde(default)]
    pub objects: Vec<ObjectSnapshot>,
}

impl ObjectSnapshot {
    /// Number of objects in the tree, the root included.
    pub fn object_count(&self) -> usize {
        1 + self
            .slots
            .iter()
            .flat_map(|slot| slot.objects.iter())
            .map(ObjectSnapshot::object_count)
            .sum::<usize>()
    }
}
