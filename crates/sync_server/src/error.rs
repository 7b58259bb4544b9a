//! Error types for the sync server.

use crate::session::ClientId;
use world_sync::{ObjectId, StoreError, StoreId, Turn, WorldError};

/// Errors raised by sessions and the server context.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// No session with this id is connected
    #[error("Client {0} is not connected")]
    UnknownClient(ClientId),

    /// The configured session limit is reached
    #[error("Session limit of {0} clients reached")]
    TooManyClients(usize),

    /// The client has not completed the authentication handshake
    #[error("Client {0} is not authenticated")]
    NotAuthenticated(ClientId),

    /// The client already observes a different object
    #[error("Client {client} is already bound to {object}")]
    AlreadyBound { client: ClientId, object: ObjectId },

    /// The client observes no object yet
    #[error("Client {0} is not bound to an object")]
    NotBound(ClientId),

    /// Acknowledged turns only move forward
    #[error("Client {client} acknowledged turn {acked} after turn {previous}")]
    AckRegression {
        client: ClientId,
        acked: Turn,
        previous: Turn,
    },

    /// The stored record is already live in the world
    #[error("Record {record} is already loaded as {object}")]
    RecordInUse { record: StoreId, object: ObjectId },

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
