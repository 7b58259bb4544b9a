//! Per-object pending change journal.
//!
//! An object cannot reach the zone that tracks it, so every mutation is noted
//! locally with the state *before* the first touch. `Zone::modify` later drains
//! the journals of a whole tree and folds them into the base container's
//! change set. Keys are deduplicated, so a journal never grows past the number
//! of distinct attributes, children and slots touched between two drains.

use crate::types::LocalId;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub(crate) struct Journal {
    attributes: BTreeMap<String, Option<Value>>,
    children: BTreeMap<LocalId, bool>,
    slots: BTreeSet<String>,
}

/// Contents of a drained journal.
pub(crate) struct JournalParts {
    pub attributes: BTreeMap<String, Option<Value>>,
    pub children: BTreeMap<LocalId, bool>,
    pub slots: BTreeSet<String>,
}

impl Journal {
    pub(crate) fn touch_attribute(&mut self, name: &str, before: Option<&Value>) {
        if !self.attributes.contains_key(name) {
            self.attributes.insert(name.to_string(), before.cloned());
        }
    }

    pub(crate) fn touch_child(&mut self, id: LocalId, existed_before: bool) {
        self.children.entry(id).or_insert(existed_before);
    }

    pub(crate) fn touch_slot(&mut self, name: &str) {
        self.slots.insert(name.to_string());
    }

    /// True when the child was created after the last drain.
    pub(crate) fn is_new_child(&self, id: LocalId) -> bool {
        matches!(self.children.get(&id), Some(false))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.children.is_empty() && self.slots.is_empty()
    }

    pub(crate) fn take(&mut self) -> Journal {
        std::mem::take(self)
    }

    pub(crate) fn clear(&mut self) {
        self.attributes.clear();
        self.children.clear();
        self.slots.clear();
    }

    pub(crate) fn into_parts(self) -> JournalParts {
        JournalParts {
            attributes: self.attributes,
            children: self.children,
            slots: self.slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_touch_wins() {
        let mut journal = Journal::default();
        journal.touch_attribute("b", Some(&Value::Int(1)));
        journal.touch_attribute("b", Some(&Value::Int(9)));
        journal.touch_child(LocalId(3), false);
        journal.touch_child(LocalId(3), true);

        assert!(journal.is_new_child(LocalId(3)));
        journal.touch_slot("bag");
        journal.touch_slot("bag");

        let parts = journal.take().into_parts();
        assert_eq!(parts.attributes.get("b"), Some(&Some(Value::Int(1))));
        assert_eq!(parts.children.get(&LocalId(3)), Some(&false));
        assert_eq!(parts.slots.len(), 1);
    }

    #[test]
    fn test_take_leaves_empty_journal() {
        let mut journal = Journal::default();
        journal.touch_attribute("a", None);
        let taken = journal.take();

        assert!(!taken.is_empty());
        assert!(journal.is_empty());

        journal.touch_slot("bag");
        assert!(!journal.is_empty());
    }
}
