//! # World
//!
//! Registry of zones. Routes object operations to the owning zone and moves
//! objects between zones.
//!
//! Zones are kept in name order, so [`World::next_turn`] visits them in the
//! same order on every run.

use crate::error::{WorldError, ZoneError};
use crate::object::WorldObject;
use crate::perception::{DetailLevel, SyncFrame};
use crate::types::{ObjectId, ObjectPath, Turn, ZoneId, ZONE_ATTRIBUTE};
use crate::zone::Zone;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct World {
    zones: BTreeMap<ZoneId, Zone>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty zone named `id`.
    pub fn add_zone(&mut self, id: impl Into<ZoneId>) -> Result<&mut Zone, WorldError> {
        let id = id.into();
        if self.zones.contains_key(&id) {
            return Err(WorldError::DuplicateZone(id));
        }
        info!("🌍 Zone {} created", id);
        Ok(self.zones.entry(id.clone()).or_insert_with(|| Zone::new(id)))
    }

    pub fn has_zone(&self, id: &ZoneId) -> bool {
        self.zones.contains_key(id)
    }

    pub fn zone(&self, id: &ZoneId) -> Option<&Zone> {
        self.zones.get(id)
    }

    pub fn zone_mut(&mut self, id: &ZoneId) -> Option<&mut Zone> {
        self.zones.get_mut(id)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    fn owning_zone(&self, id: &ZoneId) -> Result<&Zone, WorldError> {
        self.zones
            .get(id)
            .ok_or_else(|| WorldError::UnknownZone(id.clone()))
    }

    fn owning_zone_mut(&mut self, id: &ZoneId) -> Result<&mut Zone, WorldError> {
        self.zones
            .get_mut(id)
            .ok_or_else(|| WorldError::UnknownZone(id.clone()))
    }

    /// Registers `object` in the zone named by its `zoneid` attribute.
    ///
    /// The object keeps its id only when that zone issued it and it is free
    /// to register, i.e. the object was assigned but not added yet, or is
    /// coming back shortly after leaving. Any other id is replaced by a
    /// fresh one.
    pub fn add(&mut self, mut object: WorldObject) -> Result<ObjectId, WorldError> {
        let zone_id = object.zone_id().ok_or(WorldError::MissingZoneAttribute)?;
        let zone = self.owning_zone_mut(&zone_id)?;
        match object.id() {
            Some(local) if zone.can_register(local) => {}
            Some(local) => {
                debug!("🔁 Reissuing stale id {} in zone {}", local, zone_id);
                object.clear_identity();
                zone.assign_id(&mut object)?;
            }
            None => {
                zone.assign_id(&mut object)?;
            }
        }
        Ok(zone.add(object)?)
    }

    pub fn get(&self, id: &ObjectId) -> Option<&WorldObject> {
        self.zones.get(&id.zone)?.get(id)
    }

    pub fn get_mut(&mut self, id: &ObjectId) -> Option<&mut WorldObject> {
        self.zones.get_mut(&id.zone)?.get_mut(id)
    }

    pub fn get_at(&self, path: &ObjectPath) -> Option<&WorldObject> {
        self.zones.get(&path.root.zone)?.get_at(path)
    }

    pub fn has(&self, id: &ObjectId) -> bool {
        self.zones.get(&id.zone).is_some_and(|zone| zone.has(id))
    }

    pub fn remove(&mut self, id: &ObjectId) -> Result<WorldObject, WorldError> {
        Ok(self.owning_zone_mut(&id.zone)?.remove(id)?)
    }

    pub fn modify(&mut self, path: &ObjectPath) -> Result<(), WorldError> {
        Ok(self.owning_zone_mut(&path.root.zone)?.modify(path)?)
    }

    pub fn update<R>(
        &mut self,
        path: &ObjectPath,
        mutate: impl FnOnce(&mut WorldObject) -> R,
    ) -> Result<R, WorldError> {
        Ok(self.owning_zone_mut(&path.root.zone)?.update(path, mutate)?)
    }

    pub fn perception(&self, id: &ObjectId, level: DetailLevel) -> Result<SyncFrame, WorldError> {
        Ok(self.owning_zone(&id.zone)?.perception(id, level)?)
    }

    pub fn perception_since(&self, id: &ObjectId, acked: Turn) -> Result<SyncFrame, WorldError> {
        Ok(self.owning_zone(&id.zone)?.perception_since(id, acked)?)
    }

    /// Advances every zone by one turn.
    pub fn next_turn(&mut self) {
        for zone in self.zones.values_mut() {
            zone.next_turn();
        }
    }

    /// Total number of registered objects across zones.
    pub fn size(&self) -> usize {
        self.zones.values().map(Zone::len).sum()
    }

    /// Moves the object `id` from zone `old` to zone `new`.
    ///
    /// Both zones and the object are checked before anything is removed, so
    /// a failed move leaves the object where it was. The object gets a fresh
    /// identity in the destination, which is returned.
    pub fn change_zone(
        &mut self,
        old: &ZoneId,
        new: &ZoneId,
        id: &ObjectId,
    ) -> Result<ObjectId, WorldError> {
        let source = self.owning_zone(old)?;
        if &id.zone != old || !source.has(id) {
            return Err(ZoneError::UntrackedObject(id.clone()).into());
        }
        self.owning_zone(new)?;

        if old == new {
            return Ok(id.clone());
        }

        let mut object = self.owning_zone_mut(old)?.remove(id)?;
        object.clear_identity();
        object.put(ZONE_ATTRIBUTE, new.as_str());

        let destination = self.owning_zone_mut(new)?;
        destination.assign_id(&mut object)?;
        let moved = destination.add(object)?;

        debug!("🚚 Object {} moved to {}", id, moved);
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::mirror::ClientMirror;
    use crate::types::LocalId;

    fn world_with(zones: &[&str]) -> World {
        let mut world = World::new();
        for zone in zones {
            world.add_zone(*zone).unwrap();
        }
        world
    }

    fn player(zone: &str) -> WorldObject {
        let mut object = WorldObject::new();
        object.put(ZONE_ATTRIBUTE, zone);
        object.put("name", "ada");
        object
    }

    #[test]
    fn test_add_routes_by_zone_attribute() {
        let mut world = world_with(&["harbour", "keep"]);
        let id = world.add(player("keep")).unwrap();

        assert_eq!(id.zone, ZoneId::new("keep"));
        assert!(world.has(&id));
        assert_eq!(world.zone(&ZoneId::new("keep")).unwrap().len(), 1);
        assert_eq!(world.size(), 1);
    }

    #[test]
    fn test_add_rejects_missing_or_unknown_zone() {
        let mut world = world_with(&["harbour"]);

        assert_eq!(
            world.add(WorldObject::new()),
            Err(WorldError::MissingZoneAttribute)
        );
        assert_eq!(
            world.add(player("moon")),
            Err(WorldError::UnknownZone(ZoneId::new("moon")))
        );
        assert_eq!(
            world.add_zone("harbour").map(|_| ()),
            Err(WorldError::DuplicateZone(ZoneId::new("harbour")))
        );
    }

    #[test]
    fn test_add_reissues_ids_the_zone_did_not_hand_out() {
        let mut world = world_with(&["harbour"]);
        let live = world.add(player("harbour")).unwrap();

        // a copy of a live object, and an object carrying an id never issued
        let copy = world.get(&live).unwrap().clone();
        let mut stray = WorldObject::from_snapshot(copy.snapshot()).unwrap();
        stray.id = Some(LocalId(40));

        let copied = world.add(copy).unwrap();
        let strayed = world.add(stray).unwrap();

        assert_eq!(copied, ObjectId::new("harbour", 2));
        assert_eq!(strayed, ObjectId::new("harbour", 3));
        assert_eq!(world.size(), 3);
    }

    #[test]
    fn test_reloaded_object_never_takes_over_a_vacated_id() {
        let mut first_run = world_with(&["harbour"]);
        let mut ship = player("harbour");
        ship.put("name", "x");
        let stored_ship = first_run.add(ship).unwrap();
        let bytes = codec::encode(first_run.get(&stored_ship).unwrap()).unwrap();

        let mut world = world_with(&["harbour"]);
        let mut boat = player("harbour");
        boat.put("name", "y");
        let boat_id = world.add(boat).unwrap();
        assert_eq!(boat_id, stored_ship);

        let mut mirror = ClientMirror::new();
        mirror
            .apply(&world.perception(&boat_id, DetailLevel::Full).unwrap())
            .unwrap();
        world.next_turn();
        world.remove(&boat_id).unwrap();

        let reloaded = world.add(codec::decode(&bytes).unwrap()).unwrap();
        assert_ne!(reloaded, boat_id);

        mirror
            .apply(&world.perception_since(&boat_id, Turn(0)).unwrap())
            .unwrap();
        assert!(mirror.state().is_none());
        assert_eq!(world.get(&reloaded).unwrap().get_str("name").unwrap(), "x");
    }

    #[test]
    fn test_removed_object_comes_back_under_its_id() {
        let mut world = world_with(&["harbour"]);
        let id = world.add(player("harbour")).unwrap();
        let object = world.remove(&id).unwrap();

        assert_eq!(world.add(object).unwrap(), id);
    }

    #[test]
    fn test_change_zone_reissues_identity() {
        let mut world = world_with(&["harbour", "keep"]);
        world.add(player("keep")).unwrap();
        let id = world.add(player("harbour")).unwrap();
        let keep = ZoneId::new("keep");

        let moved = world.change_zone(&id.zone, &keep, &id).unwrap();

        assert_eq!(moved, ObjectId::new("keep", 2));
        assert!(!world.has(&id));
        let object = world.get(&moved).unwrap();
        assert_eq!(object.get_str(ZONE_ATTRIBUTE).unwrap(), "keep");
        assert_eq!(object.get_str("name").unwrap(), "ada");
        assert_eq!(world.size(), 2);
    }

    #[test]
    fn test_change_zone_to_unknown_zone_keeps_object() {
        let mut world = world_with(&["harbour"]);
        let id = world.add(player("harbour")).unwrap();

        let result = world.change_zone(&id.zone, &ZoneId::new("moon"), &id);

        assert_eq!(result, Err(WorldError::UnknownZone(ZoneId::new("moon"))));
        assert!(world.has(&id));
    }

    #[test]
    fn test_change_zone_same_zone_is_noop() {
        let mut world = world_with(&["harbour"]);
        let id = world.add(player("harbour")).unwrap();

        assert_eq!(world.change_zone(&id.zone, &id.zone, &id), Ok(id.clone()));
        assert!(world.has(&id));
    }

    #[test]
    fn test_next_turn_fans_out() {
        let mut world = world_with(&["b", "a"]);
        world.next_turn();
        world.next_turn();

        let turns: Vec<_> = world.zones().map(|zone| (zone.id().as_str(), zone.turn())).collect();
        assert_eq!(turns, vec![("a", Turn(2)), ("b", Turn(2))]);
    }
}
