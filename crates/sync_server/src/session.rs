//! Client sessions.
//!
//! A session is created when a client connects, marked authenticated once the
//! external handshake completes, and bound to the one root object it
//! observes. The transport reports each acknowledged turn back through the
//! registry, and the scheduler reads the bound sessions every tick to decide
//! which frame each client gets.

use crate::error::ServerError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;
use world_sync::{ObjectId, SyncFrame, Turn};

/// Unique identifier of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Creates a new random client ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of the authentication handshake, which runs outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthenticationStatus {
    #[default]
    Unauthenticated,
    Authenticated,
}

/// Server-side state of one client.
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub id: ClientId,
    pub connected_at: SystemTime,
    pub auth_status: AuthenticationStatus,
    /// Root object this client observes
    pub object: Option<ObjectId>,
    /// Latest turn the client confirmed to hold
    pub acknowledged: Option<Turn>,
    outbox: mpsc::Sender<SyncFrame>,
}

/// Everything the read phase needs to serve one session.
#[derive(Debug, Clone)]
pub struct PerceptionTarget {
    pub client: ClientId,
    pub object: ObjectId,
    pub acknowledged: Option<Turn>,
    pub outbox: mpsc::Sender<SyncFrame>,
}

/// Concurrent map of connected clients.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<ClientId, ClientSession>>,
    max_clients: usize,
    outbox_capacity: usize,
}

impl SessionRegistry {
    pub fn new(max_clients: usize, outbox_capacity: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            max_clients,
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Opens a session. Frames for the client arrive on the returned receiver.
    pub fn connect(&self) -> Result<(ClientId, mpsc::Receiver<SyncFrame>), ServerError> {
        if self.sessions.len() >= self.max_clients {
            return Err(ServerError::TooManyClients(self.max_clients));
        }

        let (outbox, inbox) = mpsc::channel(self.outbox_capacity);
        let id = ClientId::new();
        self.sessions.insert(
            id,
            ClientSession {
                id,
                connected_at: SystemTime::now(),
                auth_status: AuthenticationStatus::Unauthenticated,
                object: None,
                acknowledged: None,
                outbox,
            },
        );
        info!("🔗 Client {} connected", id);
        Ok((id, inbox))
    }

    /// Records a completed authentication handshake.
    pub fn mark_authenticated(&self, client: ClientId) -> Result<(), ServerError> {
        let mut session = self
            .sessions
            .get_mut(&client)
            .ok_or(ServerError::UnknownClient(client))?;
        session.auth_status = AuthenticationStatus::Authenticated;
        debug!("🔐 Client {} authenticated", client);
        Ok(())
    }

    /// Binds an authenticated client to the root object it observes.
    ///
    /// Binding to the already bound object is a no-op; binding to another
    /// one fails.
    pub fn bind(&self, client: ClientId, object: ObjectId) -> Result<(), ServerError> {
        let mut session = self
            .sessions
            .get_mut(&client)
            .ok_or(ServerError::UnknownClient(client))?;
        if session.auth_status != AuthenticationStatus::Authenticated {
            return Err(ServerError::NotAuthenticated(client));
        }
        if let Some(bound) = &session.object {
            if *bound == object {
                return Ok(());
            }
            return Err(ServerError::AlreadyBound {
                client,
                object: bound.clone(),
            });
        }

        info!("🎯 Client {} observes {}", client, object);
        session.object = Some(object);
        session.acknowledged = None;
        Ok(())
    }

    /// Points every session observing `old` at `new`, forcing a full resync.
    pub fn rebind_object(&self, old: &ObjectId, new: &ObjectId) -> usize {
        let mut moved = 0;
        for mut session in self.sessions.iter_mut() {
            if session.object.as_ref() == Some(old) {
                session.object = Some(new.clone());
                session.acknowledged = None;
                moved += 1;
            }
        }
        if moved > 0 {
            debug!("🔀 {} session(s) follow {} to {}", moved, old, new);
        }
        moved
    }

    /// Records the latest turn the client holds. Acknowledgements never move
    /// backwards.
    pub fn acknowledge(&self, client: ClientId, turn: Turn) -> Result<(), ServerError> {
        let mut session = self
            .sessions
            .get_mut(&client)
            .ok_or(ServerError::UnknownClient(client))?;
        if session.object.is_none() {
            return Err(ServerError::NotBound(client));
        }
        if let Some(previous) = session.acknowledged {
            if turn < previous {
                return Err(ServerError::AckRegression {
                    client,
                    acked: turn,
                    previous,
                });
            }
        }
        session.acknowledged = Some(turn);
        Ok(())
    }

    pub fn disconnect(&self, client: ClientId) -> Option<ClientSession> {
        let (_, session) = self.sessions.remove(&client)?;
        info!("❌ Client {} disconnected", client);
        Some(session)
    }

    pub fn session(&self, client: ClientId) -> Option<ClientSession> {
        self.sessions.get(&client).map(|session| session.clone())
    }

    /// What the read phase needs to serve `client`, refused for clients that
    /// are not authenticated or not bound.
    pub fn perception_target(&self, client: ClientId) -> Result<PerceptionTarget, ServerError> {
        let session = self
            .sessions
            .get(&client)
            .ok_or(ServerError::UnknownClient(client))?;
        Self::target_of(&session)
    }

    /// Targets of every authenticated, bound session.
    pub fn perception_targets(&self) -> Vec<PerceptionTarget> {
        self.sessions
            .iter()
            .filter_map(|session| Self::target_of(&session).ok())
            .collect()
    }

    /// Distinct objects observed by at least one session.
    pub fn bound_objects(&self) -> Vec<ObjectId> {
        let mut objects: Vec<ObjectId> = self
            .sessions
            .iter()
            .filter_map(|session| session.object.clone())
            .collect();
        objects.sort();
        objects.dedup();
        objects
    }

    fn target_of(session: &ClientSession) -> Result<PerceptionTarget, ServerError> {
        if session.auth_status != AuthenticationStatus::Authenticated {
            return Err(ServerError::NotAuthenticated(session.id));
        }
        let object = session
            .object
            .clone()
            .ok_or(ServerError::NotBound(session.id))?;
        Ok(PerceptionTarget {
            client: session.id,
            object,
            acknowledged: session.acknowledged,
            outbox: session.outbox.clone(),
        })
    }
}
