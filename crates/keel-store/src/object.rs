use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keel_types::{ComponentRef, ContentHasher, ObjectId};

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw payload content (component file contents).
    Blob,
    /// Serialized component version record.
    Version,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Version => write!(f, "version"),
        }
    }
}

/// A stored object: kind tag + serialized data + cached size.
///
/// `StoredObject` is the unit of storage and of transfer between scopes.
/// The store never interprets the contents of the data — it is a pure
/// key-value store keyed by content hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// The type of this object.
    pub kind: ObjectKind,
    /// The serialized bytes of the object.
    pub data: Vec<u8>,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredObject {
    /// Create a new stored object from kind and data.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed ID for this object.
    ///
    /// Uses the appropriate domain-separated hasher for each object kind.
    pub fn compute_id(&self) -> ObjectId {
        let hasher = match self.kind {
            ObjectKind::Blob => &ContentHasher::BLOB,
            ObjectKind::Version => &ContentHasher::VERSION,
        };
        hasher.hash(&self.data)
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw payload content object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob from raw bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, self.data.clone())
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != ObjectKind::Blob {
            return Err(StoreError::CorruptObject {
                id: obj.compute_id(),
                reason: format!("expected blob, got {}", obj.kind),
            });
        }
        Ok(Self {
            data: obj.data.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Version record
// ---------------------------------------------------------------------------

/// A named payload file carried by a version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name within the component.
    pub name: String,
    /// Content-addressed ID of the blob holding the file contents.
    pub blob: ObjectId,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, blob: ObjectId) -> Self {
        Self {
            name: name.into(),
            blob,
        }
    }
}

/// Human-readable metadata recorded at tag time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLog {
    /// Tag message.
    pub message: String,
    /// Wall-clock timestamp of the tag.
    pub timestamp: DateTime<Utc>,
}

/// An immutable component version record.
///
/// Created once at tag time and never mutated. The flattened dependency set
/// reflects the dependency graph at tag time, not at resolution time: it is
/// computed when the version is created and travels with the object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionObject {
    /// Declared direct dependencies.
    pub dependencies: Vec<ComponentRef>,
    /// The full transitive dependency closure, computed at tag time.
    pub flattened_dependencies: Vec<ComponentRef>,
    /// Parent snapshot id(s) in the component's version history.
    pub parents: Vec<ObjectId>,
    /// Payload file references.
    pub files: Vec<FileEntry>,
    /// Tag metadata.
    pub log: VersionLog,
}

impl VersionObject {
    /// Create a new version record.
    ///
    /// Dependency lists and files are sorted for deterministic hashing.
    pub fn new(
        mut dependencies: Vec<ComponentRef>,
        mut flattened_dependencies: Vec<ComponentRef>,
        parents: Vec<ObjectId>,
        mut files: Vec<FileEntry>,
        log: VersionLog,
    ) -> Self {
        dependencies.sort();
        dependencies.dedup();
        flattened_dependencies.sort();
        flattened_dependencies.dedup();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            dependencies,
            flattened_dependencies,
            parents,
            files,
            log,
        }
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Version, data))
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != ObjectKind::Version {
            return Err(StoreError::CorruptObject {
                id: obj.compute_id(),
                reason: format!("expected version, got {}", obj.kind),
            });
        }
        serde_json::from_slice(&obj.data).map_err(|e| StoreError::CorruptObject {
            id: obj.compute_id(),
            reason: e.to_string(),
        })
    }

    /// All object ids this version references directly (parents + files).
    pub fn referenced_objects(&self) -> Vec<ObjectId> {
        self.parents
            .iter()
            .chain(self.files.iter().map(|f| &f.blob))
            .copied()
            .collect()
    }
}
