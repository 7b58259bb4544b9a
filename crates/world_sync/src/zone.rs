//! # Zones
//!
//! A zone owns a set of root objects, hands out their identities, advances
//! turns and builds perceptions from the two retained change generations.
//!
//! Zones are single-writer: `add`, `modify`, `remove` and `next_turn` take
//! `&mut self`, perceptions take `&self`. The scheduler driving the zone is
//! responsible for running all writes of a tick before its reads.

use crate::changes::{ChangeHistory, ChangeSet};
use crate::error::ZoneError;
use crate::object::WorldObject;
use crate::perception::{delta_frame, full_frame, DetailLevel, SyncFrame};
use crate::types::{LocalId, ObjectId, ObjectPath, Turn, ZoneId, ZONE_ATTRIBUTE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, warn};

/// Bookkeeping counters of a zone.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneStats {
    /// Root objects registered since creation
    pub objects_added: u64,
    /// Root objects unregistered since creation
    pub objects_removed: u64,
    /// Change records folded in by `modify`
    pub changes_recorded: u64,
    /// Highest number of simultaneously registered objects
    pub peak_objects: usize,
}

/// Partition of the world owning a set of objects and their change history.
#[derive(Debug)]
pub struct Zone {
    id: ZoneId,
    turn: Turn,
    last_id: u32,
    /// Ids handed out by `assign_id` and not registered yet
    reserved: BTreeSet<LocalId>,
    objects: BTreeMap<LocalId, WorldObject>,
    history: BTreeMap<LocalId, ChangeHistory>,
    stats: ZoneStats,
}

impl Zone {
    pub fn new(id: impl Into<ZoneId>) -> Self {
        Self {
            id: id.into(),
            turn: Turn::default(),
            last_id: 0,
            reserved: BTreeSet::new(),
            objects: BTreeMap::new(),
            history: BTreeMap::new(),
            stats: ZoneStats::default(),
        }
    }

    pub fn id(&self) -> &ZoneId {
        &self.id
    }

    pub fn turn(&self) -> Turn {
        self.turn
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn stats(&self) -> &ZoneStats {
        &self.stats
    }

    /// Ids of all registered objects in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().map(|local| self.object_id(*local))
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &WorldObject)> {
        self.objects
            .iter()
            .map(|(local, object)| (self.object_id(*local), object))
    }

    fn object_id(&self, local: LocalId) -> ObjectId {
        ObjectId {
            zone: self.id.clone(),
            local,
        }
    }

    /// Gives `object` a fresh identity in this zone and stamps its `zoneid`.
    ///
    /// Fails when the object already holds an identity issued by this zone.
    pub fn assign_id(&mut self, object: &mut WorldObject) -> Result<ObjectId, ZoneError> {
        if let Some(existing) = object.object_id().filter(|id| id.zone == self.id) {
            return Err(ZoneError::AlreadyAssigned(existing));
        }

        self.last_id += 1;
        let local = LocalId(self.last_id);
        self.reserved.insert(local);
        object.id = Some(local);
        object.put(ZONE_ATTRIBUTE, self.id.as_str());
        Ok(self.object_id(local))
    }

    /// True when `local` was issued by this zone and may be registered: it
    /// was assigned and never added, or its object left the zone recently
    /// enough that clients still remember it.
    pub fn can_register(&self, local: LocalId) -> bool {
        self.reserved.contains(&local)
            || (self.history.contains_key(&local) && !self.objects.contains_key(&local))
    }

    /// Registers a root object whose identity was issued by this zone.
    ///
    /// Its whole initial state counts as added in the current generation.
    /// Registering an id that left the zone earlier in the window makes
    /// clients replace the object. Ids this zone did not issue, or whose
    /// history has expired, are refused.
    pub fn add(&mut self, mut object: WorldObject) -> Result<ObjectId, ZoneError> {
        let local = object.id().ok_or_else(|| ZoneError::NotAssigned(self.id.clone()))?;
        match object.zone_id() {
            Some(zone) if zone == self.id => {}
            Some(found) => {
                return Err(ZoneError::WrongZone {
                    expected: self.id.clone(),
                    found,
                })
            }
            None => return Err(ZoneError::NotAssigned(self.id.clone())),
        }

        let id = self.object_id(local);
        if self.objects.contains_key(&local) {
            return Err(ZoneError::DuplicateObject(id));
        }
        if !self.can_register(local) {
            warn!("⚠️ Zone {} refused {}: identity not issued here", self.id, id);
            return Err(ZoneError::ForeignIdentity(id));
        }

        object.discard_journals();
        self.reserved.remove(&local);
        self.history
            .entry(local)
            .or_default()
            .current
            .record_root(false, true);
        self.objects.insert(local, object);

        self.stats.objects_added += 1;
        self.stats.peak_objects = self.stats.peak_objects.max(self.objects.len());
        debug!("➕ Zone {} registered object {} at {}", self.id, id, self.turn);
        Ok(id)
    }

    pub fn has(&self, id: &ObjectId) -> bool {
        self.local_of(id).is_some_and(|local| self.objects.contains_key(&local))
    }

    pub fn get(&self, id: &ObjectId) -> Option<&WorldObject> {
        self.objects.get(&self.local_of(id)?)
    }

    /// Mutable access to a root. Changes made through it reach clients only
    /// after [`Zone::modify`].
    pub fn get_mut(&mut self, id: &ObjectId) -> Option<&mut WorldObject> {
        let local = self.local_of(id)?;
        self.objects.get_mut(&local)
    }

    pub fn get_at(&self, path: &ObjectPath) -> Option<&WorldObject> {
        self.get(path.base_container())?.resolve(&path.chain)
    }

    pub fn get_at_mut(&mut self, path: &ObjectPath) -> Option<&mut WorldObject> {
        self.get_mut(path.base_container())?.resolve_mut(&path.chain)
    }

    /// Root of the containment tree `path` points into.
    pub fn base_container(&self, path: &ObjectPath) -> Option<&WorldObject> {
        self.get(path.base_container())
    }

    fn local_of(&self, id: &ObjectId) -> Option<LocalId> {
        (id.zone == self.id).then_some(id.local)
    }

    /// Records the pending changes of the tree containing `path` against its
    /// base container's current generation.
    pub fn modify(&mut self, path: &ObjectPath) -> Result<(), ZoneError> {
        let root_id = path.base_container();
        let Some(root) = self.get_mut(root_id) else {
            error!("❌ modify on untracked object {} in zone {}", root_id, self.id);
            return Err(ZoneError::UntrackedObject(root_id.clone()));
        };
        if root.resolve(&path.chain).is_none() {
            error!("❌ modify on unresolvable path {} in zone {}", path, self.id);
            return Err(ZoneError::ObjectNotFound(path.clone()));
        }

        let mut changes = Vec::new();
        root.drain_changes(&mut Vec::new(), &mut changes);
        let count = changes.len();

        let history = self.history.entry(root_id.local).or_default();
        for change in changes {
            history.current.record(change);
        }

        self.stats.changes_recorded += count as u64;
        debug!("📝 Recorded {} change(s) for {} at {}", count, root_id, self.turn);
        Ok(())
    }

    /// Mutates the object at `path` and records the result in one step.
    pub fn update<R>(
        &mut self,
        path: &ObjectPath,
        mutate: impl FnOnce(&mut WorldObject) -> R,
    ) -> Result<R, ZoneError> {
        let Some(root) = self.get_mut(path.base_container()) else {
            error!("❌ update on untracked object {} in zone {}", path, self.id);
            return Err(ZoneError::UntrackedObject(path.base_container().clone()));
        };
        let object = root
            .resolve_mut(&path.chain)
            .ok_or_else(|| ZoneError::ObjectNotFound(path.clone()))?;

        let result = mutate(object);
        self.modify(path)?;
        Ok(result)
    }

    /// Unregisters a root object and records its deletion.
    pub fn remove(&mut self, id: &ObjectId) -> Result<WorldObject, ZoneError> {
        let Some(mut object) = self.local_of(id).and_then(|local| self.objects.remove(&local)) else {
            error!("❌ remove of untracked object {} from zone {}", id, self.id);
            return Err(ZoneError::UntrackedObject(id.clone()));
        };

        object.discard_journals();
        self.history
            .entry(id.local)
            .or_default()
            .current
            .record_root(true, false);

        self.stats.objects_removed += 1;
        debug!("➖ Zone {} removed object {} at {}", self.id, id, self.turn);
        Ok(object)
    }

    /// Ends the current turn.
    ///
    /// Events were delivered during the read phase and are cleared. Every
    /// history ages one generation; the oldest generation is discarded.
    pub fn next_turn(&mut self) -> Turn {
        for (local, object) in &mut self.objects {
            if object.has_pending_changes() {
                warn!(
                    "⚠️ Object {}#{} has mutations never passed to modify; they will surface next turn",
                    self.id, local
                );
            }
            object.clear_visible();
        }

        for history in self.history.values_mut() {
            history.rotate();
        }
        self.history.retain(|_, history| !history.is_empty());

        self.turn = self.turn.next();
        debug!("⏭️ Zone {} advanced to {}", self.id, self.turn);
        self.turn
    }

    /// Builds the frame for `id` at the requested detail.
    ///
    /// A delta spans both retained generations and applies to any client
    /// state from two turns ago onwards. An object registered last turn is
    /// not sent whole again: its delta lists what changed since, and applies
    /// to clients that received the registration frame.
    pub fn perception(&self, id: &ObjectId, level: DetailLevel) -> Result<SyncFrame, ZoneError> {
        match level {
            DetailLevel::Full => {
                let object = self.get(id).ok_or_else(|| ZoneError::UntrackedObject(id.clone()))?;
                Ok(full_frame(id, object, self.turn))
            }
            DetailLevel::Delta => match self.history_of(id)? {
                // the registration frame already carried the whole object
                Some(history) if history.registered_in_previous() => Ok(delta_frame(
                    id,
                    self.get(id),
                    &history.window_after_registration(),
                    self.turn.back(1),
                    self.turn,
                    true,
                )),
                history => {
                    let window = history.map(ChangeHistory::window).unwrap_or_default();
                    Ok(delta_frame(id, self.get(id), &window, self.turn.back(2), self.turn, true))
                }
            },
        }
    }

    /// Builds the smallest delta bringing a client that applied the frame of
    /// turn `acked` up to date.
    ///
    /// Fails with [`ZoneError::GenerationExpired`] when the client is further
    /// behind than the retained generations reach; callers answer that with a
    /// FULL frame.
    pub fn perception_since(&self, id: &ObjectId, acked: Turn) -> Result<SyncFrame, ZoneError> {
        if acked > self.turn {
            return Err(ZoneError::AckFromFuture {
                acked,
                current: self.turn,
            });
        }

        let history = self.history_of(id)?;
        let window = match self.turn.0 - acked.0 {
            0 => ChangeSet::new(),
            1 => history.map(|history| history.current.clone()).unwrap_or_default(),
            2 => history.map(ChangeHistory::window).unwrap_or_default(),
            _ => {
                return Err(ZoneError::GenerationExpired {
                    acked,
                    oldest: Turn(self.turn.0 - 2),
                })
            }
        };

        let caught_up = acked == self.turn;
        Ok(delta_frame(id, self.get(id), &window, Some(acked), self.turn, !caught_up))
    }

    /// History of `id`; fails when the zone neither holds nor remembers it.
    fn history_of(&self, id: &ObjectId) -> Result<Option<&ChangeHistory>, ZoneError> {
        let history = self.local_of(id).and_then(|local| self.history.get(&local));
        if history.is_none() && !self.has(id) {
            return Err(ZoneError::UntrackedObject(id.clone()));
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(zone: &mut Zone) -> ObjectId {
        let mut object = WorldObject::new();
        object.put("a", 1);
        zone.assign_id(&mut object).unwrap();
        zone.add(object).unwrap()
    }

    #[test]
    fn test_assign_id_is_once_per_zone() {
        let mut zone = Zone::new("test");
        let mut object = WorldObject::new();
        let id = zone.assign_id(&mut object).unwrap();

        assert_eq!(id, ObjectId::new("test", 1));
        assert_eq!(object.get_str(ZONE_ATTRIBUTE).unwrap(), "test");
        assert_eq!(zone.assign_id(&mut object), Err(ZoneError::AlreadyAssigned(id)));
    }

    #[test]
    fn test_add_requires_identity_from_this_zone() {
        let mut zone = Zone::new("test");
        assert_eq!(
            zone.add(WorldObject::new()),
            Err(ZoneError::NotAssigned(ZoneId::new("test")))
        );

        let mut other = Zone::new("other");
        let mut object = WorldObject::new();
        other.assign_id(&mut object).unwrap();
        assert_eq!(
            zone.add(object),
            Err(ZoneError::WrongZone {
                expected: ZoneId::new("test"),
                found: ZoneId::new("other"),
            })
        );
    }

    #[test]
    fn test_add_refuses_ids_not_issued_here() {
        let mut zone = Zone::new("test");
        let mut object = WorldObject::new();
        object.put(ZONE_ATTRIBUTE, "test");
        object.id = Some(LocalId(3));

        assert_eq!(
            zone.add(object.clone()),
            Err(ZoneError::ForeignIdentity(ObjectId::new("test", 3)))
        );

        // nor can a removed object once its history has expired
        let id = tracked(&mut zone);
        let removed = zone.remove(&id).unwrap();
        zone.next_turn();
        zone.next_turn();
        zone.next_turn();
        assert_eq!(zone.add(removed), Err(ZoneError::ForeignIdentity(id)));
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let mut zone = Zone::new("test");
        let id = tracked(&mut zone);
        let copy = zone.get(&id).unwrap().clone();

        assert_eq!(zone.add(copy), Err(ZoneError::DuplicateObject(id)));
        assert_eq!(zone.len(), 1);
    }

    #[test]
    fn test_untracked_modify_and_remove_fail() {
        let mut zone = Zone::new("test");
        let stranger = ObjectId::new("test", 42);

        assert_eq!(
            zone.modify(&ObjectPath::root(stranger.clone())),
            Err(ZoneError::UntrackedObject(stranger.clone()))
        );
        assert_eq!(
            zone.remove(&stranger).unwrap_err(),
            ZoneError::UntrackedObject(stranger.clone())
        );
        assert_eq!(
            zone.perception(&stranger, DetailLevel::Delta),
            Err(ZoneError::UntrackedObject(stranger))
        );
    }

    #[test]
    fn test_modify_of_missing_child_fails() {
        let mut zone = Zone::new("test");
        let id = tracked(&mut zone);
        let path = ObjectPath::root(id).child(LocalId(9));

        assert_eq!(zone.modify(&path), Err(ZoneError::ObjectNotFound(path)));
    }

    #[test]
    fn test_ack_window_bounds() {
        let mut zone = Zone::new("test");
        let id = tracked(&mut zone);
        for _ in 0..4 {
            zone.next_turn();
        }

        assert!(zone.perception_since(&id, Turn(4)).unwrap().is_empty_delta());
        assert!(zone.perception_since(&id, Turn(2)).is_ok());

        let expired = zone.perception_since(&id, Turn(1)).unwrap_err();
        assert_eq!(
            expired,
            ZoneError::GenerationExpired {
                acked: Turn(1),
                oldest: Turn(2)
            }
        );
        assert!(expired.requires_full_resync());

        assert_eq!(
            zone.perception_since(&id, Turn(5)),
            Err(ZoneError::AckFromFuture {
                acked: Turn(5),
                current: Turn(4)
            })
        );
    }

    #[test]
    fn test_events_skip_clients_holding_the_current_turn() {
        let mut zone = Zone::new("test");
        let id = tracked(&mut zone);
        zone.next_turn();
        zone.get_mut(&id).unwrap().add_event("chat", "hello");

        assert!(zone.perception_since(&id, Turn(1)).unwrap().is_empty_delta());
        match zone.perception_since(&id, Turn(0)).unwrap() {
            SyncFrame::Delta { events, .. } => assert_eq!(events.len(), 1),
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn test_history_dropped_once_quiet() {
        let mut zone = Zone::new("test");
        let id = tracked(&mut zone);
        zone.next_turn();
        zone.remove(&id).unwrap();

        zone.next_turn();
        assert!(zone.perception(&id, DetailLevel::Delta).is_ok());
        zone.next_turn();
        assert_eq!(
            zone.perception(&id, DetailLevel::Delta),
            Err(ZoneError::UntrackedObject(id))
        );
    }

    #[test]
    fn test_next_turn_clears_events() {
        let mut zone = Zone::new("test");
        let id = tracked(&mut zone);
        zone.get_mut(&id).unwrap().add_event("chat", "hello");

        zone.next_turn();
        assert!(zone.get(&id).unwrap().events().is_empty());
        assert_eq!(zone.turn(), Turn(1));
    }

    #[test]
    fn test_stats_track_lifecycle() {
        let mut zone = Zone::new("test");
        let first = tracked(&mut zone);
        tracked(&mut zone);
        zone.update(&ObjectPath::root(first.clone()), |object| object.put("a", 2))
            .unwrap();
        zone.remove(&first).unwrap();

        let stats = zone.stats();
        assert_eq!(stats.objects_added, 2);
        assert_eq!(stats.objects_removed, 1);
        assert_eq!(stats.changes_recorded, 1);
        assert_eq!(stats.peak_objects, 2);
    }
}
