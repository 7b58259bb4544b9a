//! Error types for the synchronization core.
//!
//! Each concern gets its own enum so callers can tell a programming error
//! (tracking an object the zone never saw) from a protocol outcome (a client
//! that fell too far behind) or an infrastructure failure (storage I/O).

use crate::types::{LocalId, ObjectId, ObjectPath, Turn, ZoneId};
use thiserror::Error;

/// Errors raised by typed attribute access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    /// The attribute is not present on the object
    #[error("Attribute {0} not found")]
    Missing(String),

    /// The attribute holds a different variant than the one requested
    #[error("Attribute type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors raised by structural operations on a single object tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    /// A slot with this name already exists on the object
    #[error("Slot {0} already exists")]
    SlotExists(String),

    /// No slot with this name exists on the object
    #[error("Slot {0} not found")]
    SlotNotFound(String),

    /// A snapshot repeats a child id under the same parent
    #[error("Duplicate child id {0} in snapshot")]
    DuplicateChild(LocalId),
}

/// Errors raised by zone bookkeeping and perception building.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    /// `assign_id` was called on an object that already holds an id for this zone
    #[error("Object already holds id {0}")]
    AlreadyAssigned(ObjectId),

    /// The object carries an id issued by a different zone
    #[error("Object belongs to zone {found}, not {expected}")]
    WrongZone { expected: ZoneId, found: ZoneId },

    /// The object was handed to `add` without a zone-assigned identity
    #[error("Object has no identity assigned by zone {0}")]
    NotAssigned(ZoneId),

    /// An object with this id is already registered
    #[error("Object {0} is already registered")]
    DuplicateObject(ObjectId),

    /// The id was not issued by this zone, or its history has expired
    #[error("Object id {0} was not issued by this zone")]
    ForeignIdentity(ObjectId),

    /// `modify`/`remove`/perception targeted an object the zone does not track
    #[error("Object {0} is not tracked by this zone")]
    UntrackedObject(ObjectId),

    /// The root is tracked but the nested path does not resolve
    #[error("Object path {0} does not resolve")]
    ObjectNotFound(ObjectPath),

    /// The client acknowledged a turn older than the retained generations
    #[error("Generation expired: acknowledged {acked}, oldest retained baseline is {oldest}")]
    GenerationExpired { acked: Turn, oldest: Turn },

    /// The client acknowledged a turn the zone has not reached yet
    #[error("Acknowledged turn {acked} is ahead of current turn {current}")]
    AckFromFuture { acked: Turn, current: Turn },
}

impl ZoneError {
    /// True when the caller must fall back to a FULL resync.
    pub fn requires_full_resync(&self) -> bool {
        matches!(self, ZoneError::GenerationExpired { .. })
    }
}

/// Errors raised by the zone registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// No zone with this name is registered
    #[error("Zone {0} not found")]
    UnknownZone(ZoneId),

    /// A zone with this name is already registered
    #[error("Zone {0} already registered")]
    DuplicateZone(ZoneId),

    /// The object has no usable `zoneid` attribute to route on
    #[error("Object has no zoneid attribute")]
    MissingZoneAttribute,

    #[error(transparent)]
    Zone(#[from] ZoneError),
}

/// Errors raised when a client applies frames to its local mirror.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    /// Frames must arrive in non-decreasing turn order
    #[error("Stale frame for turn {frame}, mirror already at {applied}")]
    StaleFrame { frame: Turn, applied: Turn },

    /// The delta needs a baseline the mirror does not hold
    #[error("Delta requires baseline {since:?}, mirror holds {applied:?}")]
    MissingBaseline {
        since: Option<Turn>,
        applied: Option<Turn>,
    },

    /// The frame describes a different root object
    #[error("Frame for {frame} applied to mirror of {mirror}")]
    ObjectMismatch { frame: ObjectId, mirror: ObjectId },

    /// A delta entry points to an object the mirror does not have
    #[error("Delta entry targets unknown path {0}")]
    UnknownPath(ObjectPath),

    #[error(transparent)]
    Object(#[from] ObjectError),
}

/// Errors raised while encoding or decoding persisted objects.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Object(#[from] ObjectError),
}

/// Errors raised by the persistence collaborator.
///
/// "Not found" and "I/O failure" are kept apart so callers can decide between
/// creating a fresh object and aborting.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No stored record under this id
    #[error("Stored object {0} not found")]
    NotFound(u64),

    /// The storage backend failed
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record exists but could not be decoded completely
    #[error("Stored object {id} is corrupt: {source}")]
    Corrupt {
        id: u64,
        #[source]
        source: CodecError,
    },

    /// The object could not be encoded for storage
    #[error("Failed to encode object: {0}")]
    Encode(#[source] CodecError),
}
