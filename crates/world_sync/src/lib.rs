//! # World Sync
//!
//! Server-side state synchronization core for a multiplayer world server.
//! It keeps every client's copy of shared world objects consistent with the
//! authoritative state, sending incremental deltas that survive a lost
//! acknowledgement without falling back to full snapshots.
//!
//! ## Core Features
//!
//! - **Hierarchical objects**: typed attributes plus named slots of child objects, any depth
//! - **Change tracking**: mutations are journaled per object and folded into the base container's change set
//! - **Delta-squared**: two change generations per object, so a client one acknowledgement behind still gets a correct delta
//! - **Idempotent deltas**: a delta applies cleanly to any client state inside its window
//! - **Persistence**: compressed snapshots behind the [`ObjectStore`] trait
//!
//! ## Flow
//!
//! Game logic mutates a [`WorldObject`], [`Zone::modify`] records the change,
//! [`Zone::next_turn`] rotates generations once per tick, and
//! [`Zone::perception`] / [`Zone::perception_since`] build the [`SyncFrame`]
//! for a client. [`World`] routes all of it to the owning zone.
//!
//! ## Quick Start Example
//!
//! ```rust
//! use world_sync::*;
//!
//! let mut world = World::new();
//! world.add_zone("harbour").unwrap();
//!
//! let mut player = WorldObject::new();
//! player.put(ZONE_ATTRIBUTE, "harbour");
//! player.put("hp", 10);
//! let id = world.add(player).unwrap();
//!
//! // the client applies the snapshot of turn 0
//! let mut client = ClientMirror::new();
//! client.apply(&world.perception(&id, DetailLevel::Full).unwrap()).unwrap();
//! world.next_turn();
//!
//! // turn 1: the player takes damage
//! world.update(&ObjectPath::root(id.clone()), |player| player.put("hp", 7)).unwrap();
//! let acked = client.acknowledged().unwrap();
//! client.apply(&world.perception_since(&id, acked).unwrap()).unwrap();
//!
//! assert_eq!(client.state().unwrap().get_int("hp").unwrap(), 7);
//! ```

pub mod changes;
pub mod codec;
pub mod error;
pub mod mirror;
pub mod object;
pub mod perception;
pub mod store;
pub mod types;
pub mod value;
pub mod world;
pub mod zone;

#[cfg(test)]
mod tests;

pub use changes::{ChangeHistory, ChangeSet, Record, RootChange};
pub use error::{
    AttributeError, CodecError, MirrorError, ObjectError, StoreError, WorldError, ZoneError,
};
pub use mirror::ClientMirror;
pub use object::{Event, ObjectSnapshot, Slot, SlotMut, SlotSnapshot, WorldObject};
pub use perception::{DeltaEntry, DetailLevel, EventEntry, SyncFrame};
pub use store::{stored_id, FileStore, MemoryStore, ObjectStore, StoreId, DB_ID_ATTRIBUTE};
pub use types::{LocalId, ObjectId, ObjectPath, Turn, ZoneId, ZONE_ATTRIBUTE};
pub use value::Value;
pub use world::World;
pub use zone::{Zone, ZoneStats};
