//! Shared server state handed to every task.
//!
//! The context owns the world behind a `tokio` read/write lock, the session
//! registry and the object store. Work that mutates the world outside the
//! tick loop goes through the tick gate, so it lands between two ticks and
//! never between a tick's read phase and its turn advance.

use crate::error::ServerError;
use crate::session::SessionRegistry;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{error, info};
use world_sync::{
    stored_id, ObjectId, ObjectPath, ObjectStore, StoreId, World, WorldError, ZoneError, ZoneId,
    DB_ID_ATTRIBUTE,
};

#[derive(Clone)]
pub struct ServerContext {
    world: Arc<RwLock<World>>,
    sessions: SessionRegistry,
    store: Arc<dyn ObjectStore>,
    tick_gate: Arc<Mutex<()>>,
}

impl ServerContext {
    pub fn new(world: World, sessions: SessionRegistry, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            world: Arc::new(RwLock::new(world)),
            sessions,
            store,
            tick_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn world(&self) -> &Arc<RwLock<World>> {
        &self.world
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Held by the scheduler for the whole of a tick.
    pub(crate) async fn lock_tick(&self) -> MutexGuard<'_, ()> {
        self.tick_gate.lock().await
    }

    /// Runs `mutate` with exclusive access to the world, between two ticks.
    pub async fn between_ticks<R>(&self, mutate: impl FnOnce(&mut World) -> R) -> R {
        let _gate = self.lock_tick().await;
        let mut world = self.world.write().await;
        mutate(&mut world)
    }

    /// Moves an object to another zone; sessions observing it follow it to
    /// its new identity.
    pub async fn change_zone(
        &self,
        old: &ZoneId,
        new: &ZoneId,
        id: &ObjectId,
    ) -> Result<ObjectId, ServerError> {
        let moved = self
            .between_ticks(|world| world.change_zone(old, new, id))
            .await?;
        if &moved != id {
            self.sessions.rebind_object(id, &moved);
        }
        Ok(moved)
    }

    /// Loads a stored object and registers it under a fresh identity in the
    /// zone named by its `zoneid` attribute. A record already live in the
    /// world is refused.
    pub async fn load_into_world(&self, record: StoreId) -> Result<ObjectId, ServerError> {
        let _gate = self.lock_tick().await;

        let store = Arc::clone(&self.store);
        let object = tokio::task::spawn_blocking(move || store.load_object(record)).await??;

        let mut world = self.world.write().await;
        let live = world
            .zones()
            .flat_map(|zone| zone.objects())
            .find(|(_, candidate)| stored_id(candidate) == Some(record))
            .map(|(id, _)| id);
        if let Some(holder) = live {
            return Err(ServerError::RecordInUse {
                record,
                object: holder,
            });
        }
        let id = world.add(object)?;

        info!("📦 Record {} loaded as {}", record, id);
        Ok(id)
    }

    /// Stores a live object and stamps its record id on it.
    pub async fn persist_object(&self, id: &ObjectId) -> Result<StoreId, ServerError> {
        let _gate = self.lock_tick().await;

        let object = self
            .world
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WorldError::from(ZoneError::UntrackedObject(id.clone())))?;

        let store = Arc::clone(&self.store);
        let record = tokio::task::spawn_blocking(move || store.store_object(&object)).await??;

        let mut world = self.world.write().await;
        if world.get(id).and_then(stored_id) != Some(record) {
            world.update(&ObjectPath::root(id.clone()), |object| {
                object.put(DB_ID_ATTRIBUTE, record.0 as i64)
            })?;
        }
        Ok(record)
    }

    /// Stores every object observed by a session. Returns how many were
    /// stored; failures are logged and skipped.
    pub async fn persist_bound_objects(&self) -> usize {
        let mut stored = 0;
        for id in self.sessions.bound_objects() {
            match self.persist_object(&id).await {
                Ok(record) => {
                    info!("💾 {} stored as record {}", id, record);
                    stored += 1;
                }
                Err(e) => error!("❌ Failed to store {}: {}", id, e),
            }
        }
        stored
    }
}
