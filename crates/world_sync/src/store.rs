//! # Object Persistence
//!
//! The core treats storage as an opaque collaborator: objects go in, a
//! [`StoreId`] comes out, and the same id loads them back. Two stores are
//! provided, an in-memory one for tests and tools and a directory of
//! compressed files for the server.
//!
//! A stored object remembers its record in the integer `#db_id` attribute.
//! Storing an object that carries it overwrites that record.

use crate::codec;
use crate::error::StoreError;
use crate::object::WorldObject;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Attribute naming the storage record of an object.
pub const DB_ID_ATTRIBUTE: &str = "#db_id";

const RECORD_EXTENSION: &str = "obj";

/// Opaque handle of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(pub u64);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistence collaborator consumed by the server.
pub trait ObjectStore: Send + Sync {
    /// Loads a complete object, or fails with `NotFound`, `Io` or `Corrupt`.
    fn load_object(&self, id: StoreId) -> Result<WorldObject, StoreError>;

    /// Writes `object`, returning the record it was stored under.
    fn store_object(&self, object: &WorldObject) -> Result<StoreId, StoreError>;
}

/// Record named by the object's `#db_id`, if it has a usable one.
pub fn stored_id(object: &WorldObject) -> Option<StoreId> {
    object
        .get_int(DB_ID_ATTRIBUTE)
        .ok()
        .and_then(|id| u64::try_from(id).ok())
        .filter(|id| *id > 0)
        .map(StoreId)
}

/// Encodes `object` as stored under `id`, with `#db_id` stamped.
fn encode_record(object: &WorldObject, id: StoreId) -> Result<Vec<u8>, StoreError> {
    let mut record = object.clone();
    record.put(DB_ID_ATTRIBUTE, id.0 as i64);
    codec::encode(&record).map_err(StoreError::Encode)
}

fn decode_record(bytes: &[u8], id: StoreId) -> Result<WorldObject, StoreError> {
    codec::decode(bytes).map_err(|source| StoreError::Corrupt { id: id.0, source })
}

/// Picks the record for `object`: its own `#db_id`, or the next free id.
fn allocate(counter: &AtomicU64, object: &WorldObject) -> StoreId {
    match stored_id(object) {
        Some(id) => {
            counter.fetch_max(id.0, Ordering::SeqCst);
            id
        }
        None => StoreId(counter.fetch_add(1, Ordering::SeqCst) + 1),
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<StoreId, Vec<u8>>,
    last_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ObjectStore for MemoryStore {
    fn load_object(&self, id: StoreId) -> Result<WorldObject, StoreError> {
        let record = self.records.get(&id).ok_or(StoreError::NotFound(id.0))?;
        decode_record(record.value(), id)
    }

    fn store_object(&self, object: &WorldObject) -> Result<StoreId, StoreError> {
        let id = allocate(&self.last_id, object);
        let bytes = encode_record(object, id)?;
        self.records.insert(id, bytes);
        Ok(id)
    }
}

/// One compressed `<id>.obj` file per object under a directory.
#[derive(Debug)]
pub struct FileStore {
    directory: PathBuf,
    last_id: AtomicU64,
}

impl FileStore {
    /// Opens (creating if needed) the store directory and resumes id
    /// allocation after the highest record found.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, StoreError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;

        let mut highest = 0;
        for entry in fs::read_dir(&directory)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()).map(str::parse::<u64>) {
                Some(Ok(id)) => highest = highest.max(id),
                _ => warn!("⚠️ Ignoring unexpected file in object store: {}", path.display()),
            }
        }

        debug!("🗄️ Object store at {} resumes after record {}", directory.display(), highest);
        Ok(Self {
            directory,
            last_id: AtomicU64::new(highest),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn record_path(&self, id: StoreId) -> PathBuf {
        self.directory.join(format!("{}.{}", id.0, RECORD_EXTENSION))
    }
}

impl ObjectStore for FileStore {
    fn load_object(&self, id: StoreId) -> Result<WorldObject, StoreError> {
        let bytes = match fs::read(self.record_path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(id.0)),
            Err(e) => return Err(StoreError::Io(e)),
        };
        decode_record(&bytes, id)
    }

    fn store_object(&self, object: &WorldObject) -> Result<StoreId, StoreError> {
        let id = allocate(&self.last_id, object);
        let bytes = encode_record(object, id)?;

        // staged, then renamed into place
        let path = self.record_path(id);
        let staging = path.with_extension("tmp");
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &path)?;

        debug!("💾 Stored object as record {} ({})", id, path.display());
        Ok(id)
    }
}
