//! # World Objects
//!
//! The hierarchical data entity synchronized to clients: a bag of typed
//! attributes plus named slots of child objects, nested to any depth.
//!
//! ## Ownership model
//!
//! Containment is a plain owned tree. A child never stores a link to its
//! parent; nested objects are addressed with an [`ObjectPath`](crate::ObjectPath)
//! whose root is the base container, and every object keeps an index from its
//! children's ids to the slot holding them so a path resolves in O(depth).
//!
//! ## Change tracking
//!
//! Mutations are noted in a private journal (see [`journal`]) and folded into
//! the owning zone's change set by [`Zone::modify`](crate::Zone::modify).
//!
//! ## Equality
//!
//! `==` is structural: identity, attributes and slot contents, recursively.
//! Events, journals and id counters do not take part.

mod journal;
mod slot;
mod snapshot;

pub(crate) use journal::Journal;
pub use slot::{Slot, SlotMut};
pub use snapshot::{Event, ObjectSnapshot, SlotSnapshot};

use crate::changes::TrackedChange;
use crate::error::{AttributeError, ObjectError};
use crate::types::{LocalId, ObjectId, ZoneId, ZONE_ATTRIBUTE};
use crate::value::Value;
use std::collections::BTreeMap;

/// Hierarchical attribute/slot entity.
///
/// ```rust
/// use world_sync::WorldObject;
///
/// let mut chest = WorldObject::new();
/// chest.put("name", "chest");
/// chest.add_slot("content").unwrap();
///
/// let mut coin = WorldObject::new();
/// coin.put("value", 100);
/// let coin_id = chest.slot_mut("content").unwrap().add(coin);
///
/// assert_eq!(chest.child(coin_id).unwrap().get_int("value").unwrap(), 100);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WorldObject {
    pub(crate) id: Option<LocalId>,
    attributes: BTreeMap<String, Value>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) child_index: BTreeMap<LocalId, usize>,
    pub(crate) last_child_id: u32,
    events: Vec<Event>,
    pub(crate) journal: Journal,
}

impl WorldObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local id: zone-assigned for roots, parent-assigned for slot children.
    pub fn id(&self) -> Option<LocalId> {
        self.id
    }

    /// Zone named by the `zoneid` attribute, if present and a string.
    pub fn zone_id(&self) -> Option<ZoneId> {
        self.attributes
            .get(ZONE_ATTRIBUTE)
            .and_then(|value| value.as_str().ok())
            .map(ZoneId::new)
    }

    /// Full identity of a root object, once a zone has assigned it.
    pub fn object_id(&self) -> Option<ObjectId> {
        Some(ObjectId {
            zone: self.zone_id()?,
            local: self.id?,
        })
    }

    pub(crate) fn clear_identity(&mut self) {
        self.id = None;
    }

    // Attributes

    /// Sets an attribute, noting the previous state for the next `modify`.
    pub fn put(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        self.journal.touch_attribute(&name, self.attributes.get(&name));
        self.attributes.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Removes an attribute, returning its last value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let previous = self.attributes.get(name)?;
        self.journal.touch_attribute(name, Some(previous));
        self.attributes.remove(name)
    }

    pub fn get_str(&self, name: &str) -> Result<&str, AttributeError> {
        self.require(name)?.as_str()
    }

    pub fn get_int(&self, name: &str) -> Result<i64, AttributeError> {
        self.require(name)?.as_int()
    }

    pub fn get_double(&self, name: &str) -> Result<f64, AttributeError> {
        self.require(name)?.as_double()
    }

    fn require(&self, name: &str) -> Result<&Value, AttributeError> {
        self.attributes
            .get(name)
            .ok_or_else(|| AttributeError::Missing(name.to_string()))
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(name, value)| (name.as_str(), value))
    }

    // Slots

    pub fn add_slot(&mut self, name: impl Into<String>) -> Result<(), ObjectError> {
        let name = name.into();
        if self.has_slot(&name) {
            return Err(ObjectError::SlotExists(name));
        }
        self.journal.touch_slot(&name);
        self.slots.push(Slot::new(name));
        Ok(())
    }

    pub fn has_slot(&self, name: &str) -> bool {
        self.slots.iter().any(|slot| slot.name == name)
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.name == name)
    }

    pub fn slot_mut(&mut self, name: &str) -> Option<SlotMut<'_>> {
        let index = self.slots.iter().position(|slot| slot.name == name)?;
        Some(SlotMut { owner: self, index })
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    /// Name of the slot holding the direct child `id`.
    pub fn slot_of(&self, id: LocalId) -> Option<&str> {
        self.child_index
            .get(&id)
            .map(|index| self.slots[*index].name.as_str())
    }

    pub fn child(&self, id: LocalId) -> Option<&WorldObject> {
        let index = *self.child_index.get(&id)?;
        self.slots[index].get(id)
    }

    pub fn child_mut(&mut self, id: LocalId) -> Option<&mut WorldObject> {
        let index = *self.child_index.get(&id)?;
        self.slots[index]
            .objects
            .iter_mut()
            .find(|child| child.id == Some(id))
    }

    /// Walks `chain` down from this object.
    pub fn resolve(&self, chain: &[LocalId]) -> Option<&WorldObject> {
        chain
            .iter()
            .try_fold(self, |object, id| object.child(*id))
    }

    pub fn resolve_mut(&mut self, chain: &[LocalId]) -> Option<&mut WorldObject> {
        let mut object = self;
        for id in chain {
            object = object.child_mut(*id)?;
        }
        Some(object)
    }

    // Events

    pub fn add_event(&mut self, name: impl Into<String>, payload: impl Into<String>) {
        self.events.push(Event::new(name, payload));
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Drops the events of this object and of its whole subtree.
    pub fn clear_visible(&mut self) {
        self.events.clear();
        for slot in &mut self.slots {
            for child in &mut slot.objects {
                child.clear_visible();
            }
        }
    }

    pub(crate) fn has_events(&self) -> bool {
        !self.events.is_empty()
            || self
                .slots
                .iter()
                .flat_map(|slot| slot.objects.iter())
                .any(WorldObject::has_events)
    }

    // Snapshots

    /// Self-contained image of the tree, events included.
    pub fn snapshot(&self) -> ObjectSnapshot {
        self.build_snapshot(true)
    }

    /// Image of the tree as written to storage: no events, and no root
    /// identity, which only means something to the zone that issued it.
    pub fn persistent_snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            id: None,
            ..self.build_snapshot(false)
        }
    }

    fn build_snapshot(&self, with_events: bool) -> ObjectSnapshot {
        ObjectSnapshot {
            id: self.id,
            attributes: self.attributes.clone(),
            slots: self
                .slots
                .iter()
                .map(|slot| SlotSnapshot {
                    name: slot.name.clone(),
                    objects: slot
                        .objects
                        .iter()
                        .map(|child| child.build_snapshot(with_events))
                        .collect(),
                })
                .collect(),
            events: if with_events {
                self.events.clone()
            } else {
                Vec::new()
            },
        }
    }

    /// Rebuilds an object tree from its image.
    ///
    /// Fails on duplicate slot names or duplicate child ids; children without
    /// an id receive fresh ones after the highest id present.
    pub fn from_snapshot(snapshot: ObjectSnapshot) -> Result<Self, ObjectError> {
        let highest = snapshot
            .slots
            .iter()
            .flat_map(|slot| slot.objects.iter())
            .filter_map(|child| child.id)
            .map(|id| id.0)
            .max()
            .unwrap_or(0);

        let mut object = WorldObject {
            id: snapshot.id,
            attributes: snapshot.attributes,
            last_child_id: highest,
            events: snapshot.events,
            ..Default::default()
        };

        for slot_snapshot in snapshot.slots {
            object.add_slot(slot_snapshot.name)?;
            let index = object.slots.len() - 1;

            for child_snapshot in slot_snapshot.objects {
                let mut child = WorldObject::from_snapshot(child_snapshot)?;
                let id = match child.id {
                    Some(id) => id,
                    None => {
                        object.last_child_id += 1;
                        LocalId(object.last_child_id)
                    }
                };
                if object.child_index.contains_key(&id) {
                    return Err(ObjectError::DuplicateChild(id));
                }
                child.id = Some(id);
                object.child_index.insert(id, index);
                object.slots[index].objects.push(child);
            }
        }

        Ok(object)
    }

    // Journal plumbing

    pub(crate) fn discard_journals(&mut self) {
        self.journal.clear();
        for slot in &mut self.slots {
            for child in &mut slot.objects {
                child.discard_journals();
            }
        }
    }

    pub(crate) fn has_pending_changes(&self) -> bool {
        !self.journal.is_empty()
            || self
                .slots
                .iter()
                .flat_map(|slot| slot.objects.iter())
                .any(WorldObject::has_pending_changes)
    }

    /// Empties the journals of this tree into `out`, addressing each change by
    /// its chain below the base container.
    pub(crate) fn drain_changes(&mut self, chain: &mut Vec<LocalId>, out: &mut Vec<TrackedChange>) {
        let journal = self.journal.take();
        let new_children: Vec<LocalId> = self
            .child_index
            .keys()
            .copied()
            .filter(|id| journal.is_new_child(*id))
            .collect();
        let parts = journal.into_parts();

        for name in parts.slots {
            out.push(TrackedChange::Slot {
                chain: chain.clone(),
                name,
            });
        }

        for (name, before) in parts.attributes {
            let after = self.attributes.get(&name).cloned();
            out.push(TrackedChange::Attribute {
                chain: chain.clone(),
                name,
                before,
                after,
            });
        }

        for (id, existed_before) in parts.children {
            let mut child_chain = chain.clone();
            child_chain.push(id);
            out.push(TrackedChange::Child {
                chain: child_chain,
                existed_before,
                exists_after: self.child_index.contains_key(&id),
            });
        }

        for slot in &mut self.slots {
            for child in &mut slot.objects {
                let Some(id) = child.id else { continue };
                if new_children.contains(&id) {
                    // reported whole
                    child.discard_journals();
                    continue;
                }
                chain.push(id);
                child.drain_changes(chain, out);
                chain.pop();
            }
        }
    }
}

impl PartialEq for WorldObject {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.attributes == other.attributes && self.slots == other.slots
    }
}
