//! # Client Mirror
//!
//! Receiving side of the protocol: a local copy of one root object kept in
//! step by applying the frames a zone produces.
//!
//! Delta entries are idempotent, so a delta built for a window starting at
//! `since` can be applied to any mirror state between `since` and the frame's
//! turn. A mirror older than `since` must ask for a FULL frame instead.

use crate::error::MirrorError;
use crate::object::{ObjectSnapshot, WorldObject};
use crate::perception::{DeltaEntry, EventEntry, SyncFrame};
use crate::types::{ObjectId, ObjectPath, Turn};
use tracing::trace;

#[derive(Debug, Default)]
pub struct ClientMirror {
    object: Option<ObjectId>,
    state: Option<WorldObject>,
    applied: Option<Turn>,
}

impl ClientMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root object the mirror follows, once a frame was applied.
    pub fn object(&self) -> Option<&ObjectId> {
        self.object.as_ref()
    }

    /// Current local copy; `None` before the first frame or after a deletion.
    pub fn state(&self) -> Option<&WorldObject> {
        self.state.as_ref()
    }

    /// Turn of the last applied frame, i.e. the turn to acknowledge.
    pub fn acknowledged(&self) -> Option<Turn> {
        self.applied
    }

    /// Applies one frame. On error the mirror is left unchanged except for a
    /// delta that failed midway, after which a FULL frame is required.
    pub fn apply(&mut self, frame: &SyncFrame) -> Result<(), MirrorError> {
        if let Some(mirror) = &self.object {
            if mirror != frame.object() {
                return Err(MirrorError::ObjectMismatch {
                    frame: frame.object().clone(),
                    mirror: mirror.clone(),
                });
            }
        }
        if let Some(applied) = self.applied {
            if frame.turn() < applied {
                return Err(MirrorError::StaleFrame {
                    frame: frame.turn(),
                    applied,
                });
            }
        }

        match frame {
            SyncFrame::Full { snapshot, .. } => {
                self.state = Some(WorldObject::from_snapshot(snapshot.clone())?);
            }
            SyncFrame::Delta {
                since,
                added,
                modified_added,
                modified_deleted,
                deleted,
                events,
                ..
            } => {
                if let Some(since) = since {
                    if self.applied.map_or(true, |applied| applied < *since) {
                        return Err(MirrorError::MissingBaseline {
                            since: Some(*since),
                            applied: self.applied,
                        });
                    }
                }

                for entry in deleted {
                    if entry.path().is_root() {
                        self.state = None;
                    }
                }
                for entry in added.iter().chain(modified_added) {
                    self.apply_present(entry)?;
                }
                for entry in modified_deleted {
                    self.apply_absent(entry)?;
                }
                // events of a turn already applied were delivered with it
                if self.applied != Some(frame.turn()) {
                    self.replace_events(events)?;
                }
            }
        }

        if let Some(state) = &mut self.state {
            state.discard_journals();
        }
        self.object = Some(frame.object().clone());
        self.applied = Some(frame.turn());
        trace!("🪞 Mirror of {} now at {}", frame.object(), frame.turn());
        Ok(())
    }

    fn resolve_mut(&mut self, path: &ObjectPath) -> Result<&mut WorldObject, MirrorError> {
        self.state
            .as_mut()
            .and_then(|state| state.resolve_mut(&path.chain))
            .ok_or_else(|| MirrorError::UnknownPath(path.clone()))
    }

    fn apply_present(&mut self, entry: &DeltaEntry) -> Result<(), MirrorError> {
        match entry {
            DeltaEntry::Object {
                path,
                slot,
                snapshot: Some(snapshot),
            } => self.place_object(path, slot.as_deref(), snapshot),
            DeltaEntry::Object { path, .. } => Err(MirrorError::UnknownPath(path.clone())),
            DeltaEntry::Slot { path, name } => {
                let owner = self.resolve_mut(path)?;
                if !owner.has_slot(name) {
                    owner.add_slot(name.clone())?;
                }
                Ok(())
            }
            DeltaEntry::Attribute {
                path,
                name,
                value: Some(value),
            } => {
                self.resolve_mut(path)?.put(name.clone(), value.clone());
                Ok(())
            }
            DeltaEntry::Attribute { .. } => Ok(()),
        }
    }

    fn place_object(
        &mut self,
        path: &ObjectPath,
        slot: Option<&str>,
        snapshot: &ObjectSnapshot,
    ) -> Result<(), MirrorError> {
        let object = WorldObject::from_snapshot(snapshot.clone())?;
        let (Some(parent_path), Some(slot)) = (path.parent(), slot) else {
            self.state = Some(object);
            return Ok(());
        };

        let parent = self.resolve_mut(&parent_path)?;
        let Some(id) = object.id() else {
            return Err(MirrorError::UnknownPath(path.clone()));
        };
        if let Some(current) = parent.slot_of(id).map(str::to_string) {
            if let Some(mut holder) = parent.slot_mut(&current) {
                holder.remove(id);
            }
        }
        if !parent.has_slot(slot) {
            parent.add_slot(slot)?;
        }
        if let Some(mut target) = parent.slot_mut(slot) {
            target.restore(object);
        }
        Ok(())
    }

    fn apply_absent(&mut self, entry: &DeltaEntry) -> Result<(), MirrorError> {
        let Some(parent_path) = (match entry {
            DeltaEntry::Object { path, .. } => path.parent(),
            DeltaEntry::Slot { .. } => return Ok(()),
            DeltaEntry::Attribute { path, .. } => Some(path.clone()),
        }) else {
            self.state = None;
            return Ok(());
        };
        let target = self.resolve_mut(&parent_path)?;

        match entry {
            DeltaEntry::Object { path, .. } => {
                if let Some(id) = path.chain.last().copied() {
                    if let Some(slot) = target.slot_of(id).map(str::to_string) {
                        if let Some(mut holder) = target.slot_mut(&slot) {
                            holder.remove(id);
                        }
                    }
                }
            }
            DeltaEntry::Attribute { name, .. } => {
                target.remove(name);
            }
            DeltaEntry::Slot { .. } => {}
        }
        Ok(())
    }

    fn replace_events(&mut self, events: &[EventEntry]) -> Result<(), MirrorError> {
        if let Some(state) = &mut self.state {
            state.clear_visible();
        }
        for entry in events {
            self.resolve_mut(&entry.path)?
                .add_event(entry.event.name.clone(), entry.event.payload.clone());
        }
        Ok(())
    }
}
