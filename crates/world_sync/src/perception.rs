//! # Sync Frames
//!
//! Wire payloads handed to the transport, and the assembler that turns a
//! live object plus a window of change sets into a minimal delta.
//!
//! ## Classification
//!
//! Every key in the window is classified from its earliest "before" and its
//! latest "after":
//!
//! | before  | after   | list                                          |
//! |---------|---------|-----------------------------------------------|
//! | absent  | present | `added`                                       |
//! | present | present | `modified_added`                              |
//! | any     | absent  | `modified_deleted`, or `deleted` for the root |
//!
//! A key that is absent at both ends was created and dropped again inside
//! the window; a client that saw it in between still has to drop it.
//! Entries below an object that is itself added or removed are left out, an
//! added object travels once as a complete snapshot. Slots created on an
//! object the client already holds are listed in `added` as well, since an
//! empty slot is part of the object's structure.

use crate::changes::ChangeSet;
use crate::object::{Event, ObjectSnapshot, WorldObject};
use crate::types::{LocalId, ObjectId, ObjectPath, Turn};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Requested detail of a perception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Full,
    Delta,
}

/// One entry of a delta list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeltaEntry {
    /// A whole object: the root, or a slot child identified by its path.
    Object {
        path: ObjectPath,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slot: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<ObjectSnapshot>,
    },
    /// A new, initially empty slot of the object at `path`.
    Slot { path: ObjectPath, name: String },
    /// One attribute of the object at `path`.
    Attribute {
        path: ObjectPath,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

impl DeltaEntry {
    pub fn path(&self) -> &ObjectPath {
        match self {
            DeltaEntry::Object { path, .. }
            | DeltaEntry::Slot { path, .. }
            | DeltaEntry::Attribute { path, .. } => path,
        }
    }

    fn sort_key(&self) -> (&ObjectPath, u8, &str) {
        match self {
            DeltaEntry::Object { path, .. } => (path, 0, ""),
            DeltaEntry::Slot { path, name } => (path, 1, name.as_str()),
            DeltaEntry::Attribute { path, name, .. } => (path, 2, name.as_str()),
        }
    }
}

/// An event of the live tree, addressed by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    pub path: ObjectPath,
    pub event: Event,
}

/// Wire payload describing a full snapshot or an incremental delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum SyncFrame {
    Full {
        object: ObjectId,
        turn: Turn,
        snapshot: ObjectSnapshot,
    },
    Delta {
        object: ObjectId,
        /// Oldest client turn this delta applies to; `None` means from scratch.
        since: Option<Turn>,
        turn: Turn,
        added: Vec<DeltaEntry>,
        modified_added: Vec<DeltaEntry>,
        modified_deleted: Vec<DeltaEntry>,
        deleted: Vec<DeltaEntry>,
        events: Vec<EventEntry>,
    },
}

impl SyncFrame {
    pub fn object(&self) -> &ObjectId {
        match self {
            SyncFrame::Full { object, .. } | SyncFrame::Delta { object, .. } => object,
        }
    }

    pub fn turn(&self) -> Turn {
        match self {
            SyncFrame::Full { turn, .. } | SyncFrame::Delta { turn, .. } => *turn,
        }
    }

    pub fn level(&self) -> DetailLevel {
        match self {
            SyncFrame::Full { .. } => DetailLevel::Full,
            SyncFrame::Delta { .. } => DetailLevel::Delta,
        }
    }

    /// True for a delta carrying no changes and no events.
    pub fn is_empty_delta(&self) -> bool {
        match self {
            SyncFrame::Full { .. } => false,
            SyncFrame::Delta {
                added,
                modified_added,
                modified_deleted,
                deleted,
                events,
                ..
            } => {
                added.is_empty()
                    && modified_added.is_empty()
                    && modified_deleted.is_empty()
                    && deleted.is_empty()
                    && events.is_empty()
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Self-contained snapshot frame.
pub(crate) fn full_frame(id: &ObjectId, object: &WorldObject, turn: Turn) -> SyncFrame {
    SyncFrame::Full {
        object: id.clone(),
        turn,
        snapshot: object.snapshot(),
    }
}

/// Delta lists for `id` over `window`.
///
/// `live` is the object as registered now, `None` once it left the zone.
/// Events of the current turn are attached only with `with_events`; a client
/// that already holds the current turn has received them.
pub(crate) fn delta_frame(
    id: &ObjectId,
    live: Option<&WorldObject>,
    window: &ChangeSet,
    since: Option<Turn>,
    turn: Turn,
    with_events: bool,
) -> SyncFrame {
    let mut frame = DeltaLists::default();
    let root_path = ObjectPath::root(id.clone());

    match (window.root(), live) {
        (Some(root), Some(object)) if root.exists_after => {
            frame.added.push(DeltaEntry::Object {
                path: root_path,
                slot: None,
                snapshot: Some(object.snapshot()),
            });
        }
        (Some(root), _) if !root.exists_after => {
            frame.deleted.push(DeltaEntry::Object {
                path: root_path,
                slot: None,
                snapshot: None,
            });
        }
        (None, Some(object)) => {
            frame.classify(id, object, window);
            if with_events {
                frame.collect_events(&root_path, object);
            }
        }
        _ => {}
    }

    frame.into_sync_frame(id.clone(), since, turn)
}

#[derive(Default)]
struct DeltaLists {
    added: Vec<DeltaEntry>,
    modified_added: Vec<DeltaEntry>,
    modified_deleted: Vec<DeltaEntry>,
    deleted: Vec<DeltaEntry>,
    events: Vec<EventEntry>,
}

impl DeltaLists {
    fn classify(&mut self, id: &ObjectId, live: &WorldObject, window: &ChangeSet) {
        let replaced = |chain: &[LocalId]| {
            (1..=chain.len()).any(|end| window.objects().contains_key(&chain[..end]))
        };

        for (chain, record) in window.objects() {
            let Some((child_id, parent_chain)) = chain.split_last() else {
                continue;
            };
            if replaced(parent_chain) {
                continue;
            }
            let Some(parent) = live.resolve(parent_chain) else {
                continue;
            };
            let path = ObjectPath::with_chain(id.clone(), chain.clone());

            match (record.before, parent.child(*child_id)) {
                (false, Some(child)) => self.added.push(DeltaEntry::Object {
                    path,
                    slot: parent.slot_of(*child_id).map(str::to_string),
                    snapshot: Some(child.snapshot()),
                }),
                (_, None) => self.modified_deleted.push(DeltaEntry::Object {
                    path,
                    slot: None,
                    snapshot: None,
                }),
                (true, Some(_)) => {}
            }
        }

        for (chain, name) in window.added_slots() {
            if replaced(chain) || !live.resolve(chain).is_some_and(|owner| owner.has_slot(name)) {
                continue;
            }
            self.added.push(DeltaEntry::Slot {
                path: ObjectPath::with_chain(id.clone(), chain.clone()),
                name: name.clone(),
            });
        }

        for ((chain, name), record) in window.attributes() {
            if replaced(chain) || live.resolve(chain).is_none() {
                continue;
            }
            let path = ObjectPath::with_chain(id.clone(), chain.clone());
            let entry = DeltaEntry::Attribute {
                path,
                name: name.clone(),
                value: record.after.clone(),
            };

            match (&record.before, &record.after) {
                (None, Some(_)) => self.added.push(entry),
                (Some(_), Some(_)) => self.modified_added.push(entry),
                (_, None) => self.modified_deleted.push(entry),
            }
        }
    }

    fn collect_events(&mut self, path: &ObjectPath, object: &WorldObject) {
        self.events.extend(object.events().iter().map(|event| EventEntry {
            path: path.clone(),
            event: event.clone(),
        }));
        for slot in object.slots() {
            for child in slot.iter() {
                if let Some(child_id) = child.id() {
                    self.collect_events(&path.clone().child(child_id), child);
                }
            }
        }
    }

    fn into_sync_frame(mut self, object: ObjectId, since: Option<Turn>, turn: Turn) -> SyncFrame {
        for list in [
            &mut self.added,
            &mut self.modified_added,
            &mut self.modified_deleted,
            &mut self.deleted,
        ] {
            list.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        }

        SyncFrame::Delta {
            object,
            since,
            turn,
            added: self.added,
            modified_added: self.modified_added,
            modified_deleted: self.modified_deleted,
            deleted: self.deleted,
            events: self.events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_sort_objects_before_attributes() {
        let root = ObjectId::new("test", 1);
        let attribute = DeltaEntry::Attribute {
            path: ObjectPath::root(root.clone()),
            name: "a".to_string(),
            value: Some(Value::Int(1)),
        };
        let object = DeltaEntry::Object {
            path: ObjectPath::root(root.clone()),
            slot: None,
            snapshot: None,
        };
        let nested = DeltaEntry::Attribute {
            path: ObjectPath::root(root).child(LocalId(1)),
            name: "a".to_string(),
            value: None,
        };

        let slot = DeltaEntry::Slot {
            path: ObjectPath::root(ObjectId::new("test", 1)),
            name: "z".to_string(),
        };

        assert!(object.sort_key() < attribute.sort_key());
        assert!(object.sort_key() < slot.sort_key());
        assert!(slot.sort_key() < attribute.sort_key());
        assert!(attribute.sort_key() < nested.sort_key());
    }

    #[test]
    fn test_frame_wire_shape() {
        let frame = SyncFrame::Delta {
            object: ObjectId::new("test", 3),
            since: Some(Turn(1)),
            turn: Turn(2),
            added: Vec::new(),
            modified_added: vec![DeltaEntry::Attribute {
                path: ObjectPath::root(ObjectId::new("test", 3)),
                name: "b".to_string(),
                value: Some(Value::Int(9)),
            }],
            modified_deleted: Vec::new(),
            deleted: Vec::new(),
            events: Vec::new(),
        };

        let json: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(json["level"], "delta");
        assert_eq!(json["modified_added"][0]["kind"], "attribute");
        assert_eq!(json["modified_added"][0]["name"], "b");
        assert_eq!(json["modified_added"][0]["value"]["type"], "int");
        assert_eq!(json["modified_added"][0]["value"]["value"], 9);

        assert_eq!(SyncFrame::from_json(&frame.to_json().unwrap()).unwrap(), frame);
        assert!(!frame.is_empty_delta());
        assert_eq!(frame.level(), DetailLevel::Delta);
    }

    #[test]
    fn test_delta_for_departed_object_reports_deletion() {
        let id = ObjectId::new("test", 4);
        let mut window = ChangeSet::new();
        window.record_root(true, false);

        match delta_frame(&id, None, &window, Some(Turn(0)), Turn(2), true) {
            SyncFrame::Delta { deleted, added, .. } => {
                assert!(added.is_empty());
                assert_eq!(deleted.len(), 1);
                assert_eq!(deleted[0].path(), &ObjectPath::root(id));
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }
}
