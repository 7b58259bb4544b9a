//! Named, ordered child containers.

use super::WorldObject;
use crate::types::LocalId;

/// A named, ordered sequence of child objects owned by a [`WorldObject`].
#[derive(Debug, Clone)]
pub struct Slot {
    pub(crate) name: String,
    pub(crate) objects: Vec<WorldObject>,
}

impl Slot {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            objects: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn first(&self) -> Option<&WorldObject> {
        self.objects.first()
    }

    pub fn get(&self, id: LocalId) -> Option<&WorldObject> {
        self.objects.iter().find(|child| child.id() == Some(id))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorldObject> {
        self.objects.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = LocalId> + '_ {
        self.objects.iter().filter_map(WorldObject::id)
    }
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.objects == other.objects
    }
}

/// Mutable handle on one slot of an object.
///
/// Adding and removing children goes through the owner so the owner's id
/// counter, child index and journal stay in step with the slot contents.
pub struct SlotMut<'a> {
    pub(super) owner: &'a mut WorldObject,
    pub(super) index: usize,
}

impl<'a> SlotMut<'a> {
    pub fn name(&self) -> &str {
        &self.owner.slots[self.index].name
    }

    pub fn len(&self) -> usize {
        self.owner.slots[self.index].objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owner.slots[self.index].objects.is_empty()
    }

    /// Appends `child`, assigning and returning its parent-scoped id.
    ///
    /// Any id the child held before is replaced; its pending journal is
    /// discarded because the child is reported whole when first synchronized.
    pub fn add(&mut self, mut child: WorldObject) -> LocalId {
        self.owner.last_child_id += 1;
        let id = LocalId(self.owner.last_child_id);

        child.id = Some(id);
        child.discard_journals();

        self.owner.slots[self.index].objects.push(child);
        self.owner.child_index.insert(id, self.index);
        self.owner.journal.touch_child(id, false);
        id
    }

    /// Inserts a child that already carries an id, as received from a peer.
    ///
    /// The owner's counter is raised past the id so later `add`s stay unique.
    pub(crate) fn restore(&mut self, child: WorldObject) -> Option<LocalId> {
        let id = child.id()?;
        if self.owner.child_index.contains_key(&id) {
            return None;
        }
        self.owner.last_child_id = self.owner.last_child_id.max(id.0);
        self.owner.slots[self.index].objects.push(child);
        self.owner.child_index.insert(id, self.index);
        Some(id)
    }

    /// Detaches the child with `id` from this slot.
    pub fn remove(&mut self, id: LocalId) -> Option<WorldObject> {
        if self.owner.child_index.get(&id) != Some(&self.index) {
            return None;
        }

        let objects = &mut self.owner.slots[self.index].objects;
        let position = objects.iter().position(|child| child.id() == Some(id))?;
        let child = objects.remove(position);

        self.owner.child_index.remove(&id);
        self.owner.journal.touch_child(id, true);
        Some(child)
    }

    pub fn get(&self, id: LocalId) -> Option<&WorldObject> {
        self.owner.slots[self.index].get(id)
    }

    pub fn get_mut(&mut self, id: LocalId) -> Option<&mut WorldObject> {
        self.owner.slots[self.index]
            .objects
            .iter_mut()
            .find(|child| child.id() == Some(id))
    }

    pub fn first_mut(&mut self) -> Option<&mut WorldObject> {
        self.owner.slots[self.index].objects.first_mut()
    }

    /// Consumes the handle, returning the first child borrowed for the owner's lifetime.
    pub fn into_first(self) -> Option<&'a mut WorldObject> {
        let SlotMut { owner, index } = self;
        owner.slots[index].objects.first_mut()
    }

    /// Consumes the handle, returning the child with `id` borrowed for the owner's lifetime.
    pub fn into_child(self, id: LocalId) -> Option<&'a mut WorldObject> {
        let SlotMut { owner, index } = self;
        owner.slots[index]
            .objects
            .iter_mut()
            .find(|child| child.id() == Some(id))
    }
}
