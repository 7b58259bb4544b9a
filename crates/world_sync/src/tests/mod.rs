//! Scenario suites for the synchronization core.
//!
//! - Delta classification across one and two generations
//! - Snapshot, wire and storage round trips of deeply nested objects
//! - Client mirrors converging under lost and late acknowledgements


#[cfg(test)]
pub mod mirror_convergence;


use crate::{DeltaEntry, ObjectId, ObjectPath, SyncFrame, Value, WorldObject, Zone};

/// Borrowed view of the four delta lists of a frame.
#[derive(Debug)]
pub struct DeltaView<'a> {
    pub added: &'a [DeltaEntry],
    pub modified_added: &'a [DeltaEntry],
    pub modified_deleted: &'a [DeltaEntry],
    pub deleted: &'a [DeltaEntry],
}

impl DeltaView<'_> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified_added.is_empty()
            && self.modified_deleted.is_empty()
            && self.deleted.is_empty()
    }
}

pub fn delta_view(frame: &SyncFrame) -> DeltaView<'_> {
    match frame {
        SyncFrame::Delta {
            added,
            modified_added,
            modified_deleted,
            deleted,
            ..
        } => DeltaView {
            added,
            modified_added,
            modified_deleted,
            deleted,
        },
        SyncFrame::Full { .. } => panic!("expected a delta frame, got {frame:?}"),
    }
}

/// Registers `object` in `zone` under a fresh identity.
pub fn track(zone: &mut Zone, mut object: WorldObject) -> ObjectId {
    zone.assign_id(&mut object).unwrap();
    zone.add(object).unwrap()
}

pub fn attribute(path: ObjectPath, name: &str, value: Option<Value>) -> DeltaEntry {
    DeltaEntry::Attribute {
        path,
        name: name.to_string(),
        value,
    }
}
