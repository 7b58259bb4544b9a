//! # Core Identity Types
//!
//! Identifiers used throughout the synchronization core. Wrapper types keep
//! zone names, local ids and turns from being confused with each other.
//!
//! ## Key Types
//!
//! - [`ZoneId`] - Name of a zone, also stored in a root object's `zoneid` attribute
//! - [`LocalId`] - Zone-scoped id of a root object, or parent-scoped id of a slot child
//! - [`ObjectId`] - `(zone, local)` pair identifying a root object
//! - [`ObjectPath`] - Address of any object in a tracked tree, rooted at its base container
//! - [`Turn`] - Simulation tick counter of a zone

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the attribute holding a root object's zone name.
pub const ZONE_ATTRIBUTE: &str = "zoneid";

/// Unique name of a zone inside a world.
///
/// ```rust
/// use world_sync::ZoneId;
///
/// let zone = ZoneId::new("harbour");
/// assert_eq!(zone.as_str(), "harbour");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Numeric id assigned either by a zone (root objects) or by the parent
/// container (slot children).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub u32);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a root object: unique within its zone for the zone's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub zone: ZoneId,
    pub local: LocalId,
}

impl ObjectId {
    pub fn new(zone: impl Into<ZoneId>, local: u32) -> Self {
        Self {
            zone: zone.into(),
            local: LocalId(local),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.zone, self.local)
    }
}

/// Discrete simulation step of a zone. Every zone starts at turn 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Turn(pub u64);

impl Turn {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the turn `n` steps earlier, or `None` when that would precede turn 0.
    pub fn back(self, n: u64) -> Option<Self> {
        self.0.checked_sub(n).map(Self)
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Address of an object inside a tracked containment tree.
///
/// The root is the base container; `chain` lists the child ids walked from the
/// root down to the addressed object. An empty chain addresses the root itself.
/// Because the path carries the whole ancestry, resolving the base container of
/// a nested object never needs a link stored on the child.
///
/// ```rust
/// use world_sync::{ObjectId, ObjectPath, LocalId};
///
/// let root = ObjectId::new("test", 1);
/// let coin = ObjectPath::root(root.clone()).child(LocalId(1)).child(LocalId(1));
/// assert_eq!(coin.base_container(), &root);
/// assert_eq!(coin.depth(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectPath {
    pub root: ObjectId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<LocalId>,
}

impl ObjectPath {
    pub fn root(root: ObjectId) -> Self {
        Self {
            root,
            chain: Vec::new(),
        }
    }

    pub fn with_chain(root: ObjectId, chain: Vec<LocalId>) -> Self {
        Self { root, chain }
    }

    /// Extends the path by one child id.
    pub fn child(mut self, id: LocalId) -> Self {
        self.chain.push(id);
        self
    }

    /// Root object of the containment tree this path points into.
    pub fn base_container(&self) -> &ObjectId {
        &self.root
    }

    pub fn is_root(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// Path of the containing object, `None` for a root path.
    pub fn parent(&self) -> Option<ObjectPath> {
        if self.chain.is_empty() {
            return None;
        }
        let mut chain = self.chain.clone();
        chain.pop();
        Some(Self::with_chain(self.root.clone(), chain))
    }
}

impl From<ObjectId> for ObjectPath {
    fn from(root: ObjectId) -> Self {
        Self::root(root)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for id in &self.chain {
            write!(f, "/{id}")?;
        }
        Ok(())
    }
}
