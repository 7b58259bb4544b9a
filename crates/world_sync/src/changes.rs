//! # Change Sets
//!
//! Per-root, per-generation record of what changed in a containment tree.
//!
//! Every record keeps the state *before* its first change in the generation
//! and the state *after* its latest change. When the two agree the record is
//! dropped, so an attribute added and removed again (or set back to its old
//! value) within one turn never reaches a diff.
//!
//! Merging `previous` and `current` into a delta window keeps such records:
//! a client that applied the frame in between holds the intermediate state
//! and must be sent the final one.
//!
//! Slots are only ever created, so a slot record is just its key.

use crate::types::LocalId;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};

/// One journal entry drained from an object tree by `Zone::modify`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TrackedChange {
    Attribute {
        chain: Vec<LocalId>,
        name: String,
        before: Option<Value>,
        after: Option<Value>,
    },
    Child {
        chain: Vec<LocalId>,
        existed_before: bool,
        exists_after: bool,
    },
    Slot {
        chain: Vec<LocalId>,
        name: String,
    },
}

/// Earliest and latest state of a tracked key.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T> {
    pub before: T,
    pub after: T,
}

/// Membership of the root object in its zone.
///
/// Unlike the other records a root that was removed and registered again is
/// kept even though it is present at both ends: the client must replace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootChange {
    pub existed_before: bool,
    pub exists_after: bool,
}

impl RootChange {
    fn is_noop(&self) -> bool {
        !self.existed_before && !self.exists_after
    }
}

/// Attribute key: chain of child ids below the root, then attribute name.
pub type AttributeKey = (Vec<LocalId>, String);

/// Slot key: chain of the owning object below the root, then slot name.
pub type SlotKey = (Vec<LocalId>, String);

/// Changes of one generation for one root object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    root: Option<RootChange>,
    attributes: BTreeMap<AttributeKey, Record<Option<Value>>>,
    objects: BTreeMap<Vec<LocalId>, Record<bool>>,
    slots: BTreeSet<SlotKey>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
            && self.attributes.is_empty()
            && self.objects.is_empty()
            && self.slots.is_empty()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        usize::from(self.root.is_some())
            + self.attributes.len()
            + self.objects.len()
            + self.slots.len()
    }

    pub fn root(&self) -> Option<RootChange> {
        self.root
    }

    pub fn attributes(&self) -> &BTreeMap<AttributeKey, Record<Option<Value>>> {
        &self.attributes
    }

    pub fn objects(&self) -> &BTreeMap<Vec<LocalId>, Record<bool>> {
        &self.objects
    }

    /// Slots created in the generation.
    pub fn added_slots(&self) -> &BTreeSet<SlotKey> {
        &self.slots
    }

    /// Attributes present at the end of the generation with a new value.
    pub fn added_attributes(&self) -> impl Iterator<Item = (&[LocalId], &str, &Value)> {
        self.attributes
            .iter()
            .filter_map(|((chain, name), record)| {
                record
                    .after
                    .as_ref()
                    .map(|value| (chain.as_slice(), name.as_str(), value))
            })
    }

    /// Attributes that existed at the start of the generation and are gone.
    pub fn deleted_attributes(&self) -> impl Iterator<Item = (&[LocalId], &str)> {
        self.attributes
            .iter()
            .filter(|(_, record)| record.after.is_none())
            .map(|((chain, name), _)| (chain.as_slice(), name.as_str()))
    }

    pub fn added_objects(&self) -> impl Iterator<Item = &[LocalId]> {
        self.objects
            .iter()
            .filter(|(_, record)| record.after)
            .map(|(chain, _)| chain.as_slice())
    }

    pub fn deleted_objects(&self) -> impl Iterator<Item = &[LocalId]> {
        self.objects
            .iter()
            .filter(|(_, record)| !record.after)
            .map(|(chain, _)| chain.as_slice())
    }

    pub(crate) fn record_root(&mut self, existed_before: bool, exists_after: bool) {
        let change = match self.root {
            Some(earlier) => RootChange {
                existed_before: earlier.existed_before,
                exists_after,
            },
            None => RootChange {
                existed_before,
                exists_after,
            },
        };
        self.root = (!change.is_noop()).then_some(change);
    }

    pub(crate) fn record(&mut self, change: TrackedChange) {
        match change {
            TrackedChange::Attribute {
                chain,
                name,
                before,
                after,
            } => merge_record(&mut self.attributes, (chain, name), before, after, true),
            TrackedChange::Child {
                chain,
                existed_before,
                exists_after,
            } => merge_record(&mut self.objects, chain, existed_before, exists_after, true),
            TrackedChange::Slot { chain, name } => {
                self.slots.insert((chain, name));
            }
        }
    }

    /// Folds a later generation into this one, keeping the earliest "before"
    /// and the latest "after" of every key. Keys whose ends agree are kept.
    pub fn absorb(&mut self, later: &ChangeSet) {
        if let Some(root) = later.root {
            self.root = Some(RootChange {
                existed_before: self.root.map_or(root.existed_before, |earlier| earlier.existed_before),
                exists_after: root.exists_after,
            });
        }
        for (key, record) in &later.attributes {
            merge_record(
                &mut self.attributes,
                key.clone(),
                record.before.clone(),
                record.after.clone(),
                false,
            );
        }
        for (chain, record) in &later.objects {
            merge_record(&mut self.objects, chain.clone(), record.before, record.after, false);
        }
        self.slots.extend(later.slots.iter().cloned());
    }

    /// Drops the root membership record, keeping everything recorded below it.
    pub(crate) fn forget_root(&mut self) {
        self.root = None;
    }
}

fn merge_record<K: Ord, T: PartialEq>(
    records: &mut BTreeMap<K, Record<T>>,
    key: K,
    before: T,
    after: T,
    prune: bool,
) {
    let record = match records.remove(&key) {
        Some(earlier) => Record {
            before: earlier.before,
            after,
        },
        None => Record { before, after },
    };
    if !prune || record.before != record.after {
        records.insert(key, record);
    }
}

/// The two retained generations of one root object.
#[derive(Debug, Clone, Default)]
pub struct ChangeHistory {
    pub previous: ChangeSet,
    pub current: ChangeSet,
}

impl ChangeHistory {
    /// Ages `current` into `previous`; the old `previous` is discarded.
    pub fn rotate(&mut self) {
        self.previous = std::mem::take(&mut self.current);
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty() && self.current.is_empty()
    }

    /// Union of both generations.
    pub fn window(&self) -> ChangeSet {
        let mut window = self.previous.clone();
        window.absorb(&self.current);
        window
    }

    /// True when the root joined the zone during `previous` and has not
    /// left or been replaced since.
    pub fn registered_in_previous(&self) -> bool {
        self.current.root.is_none() && self.previous.root.is_some_and(|root| root.exists_after)
    }

    /// Union of both generations as seen by a client that received the root
    /// whole when it was registered: the registration itself is left out.
    pub fn window_after_registration(&self) -> ChangeSet {
        let mut window = self.window();
        window.forget_root();
        window
    }
}
