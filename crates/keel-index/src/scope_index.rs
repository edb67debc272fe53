//! The rebuildable object index: `ObjectId` → physical location.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use keel_store::{ObjectKind, ObjectStore};
use keel_types::ObjectId;

use crate::error::IndexResult;

/// One index entry: where an object lives and what it is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// The object's kind, cached for inspection without a store read.
    pub kind: ObjectKind,
    /// Physical location relative to the scope root.
    pub location: String,
}

/// The scope index: a pure lookup structure over the object store.
///
/// Never a source of truth for content — if lost or stale it is rebuilt by
/// scanning the store via [`ScopeIndex::rebuild`]. Locations use stable
/// two-level hex prefix sharding (`objects/ab/cdef…`).
pub struct ScopeIndex {
    entries: RwLock<BTreeMap<ObjectId, IndexEntry>>,
}

impl ScopeIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// The sharded location for an object id.
    pub fn location_for(id: &ObjectId) -> String {
        let hex = id.to_hex();
        format!("objects/{}/{}", &hex[..2], &hex[2..])
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Record an object's location. Idempotent.
    pub fn note(&self, id: ObjectId, kind: ObjectKind) {
        let mut map = self.entries.write().expect("lock poisoned");
        map.entry(id).or_insert_with(|| IndexEntry {
            kind,
            location: Self::location_for(&id),
        });
    }

    /// Look up an entry.
    pub fn get(&self, id: &ObjectId) -> Option<IndexEntry> {
        self.entries.read().expect("lock poisoned").get(id).cloned()
    }

    /// Drop an entry (after an administrative object removal).
    pub fn forget(&self, id: &ObjectId) -> bool {
        self.entries
            .write()
            .expect("lock poisoned")
            .remove(id)
            .is_some()
    }

    /// All entries, sorted by object id.
    pub fn entries(&self) -> Vec<(ObjectId, IndexEntry)> {
        self.entries
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(id, e)| (*id, e.clone()))
            .collect()
    }

    /// Discard the current contents and re-derive the index by scanning
    /// the store.
    pub fn rebuild(&self, store: &dyn ObjectStore) -> IndexResult<usize> {
        let ids = store.list()?;
        let mut fresh = BTreeMap::new();
        for id in ids {
            if let Some(obj) = store.read(&id)? {
                fresh.insert(
                    id,
                    IndexEntry {
                        kind: obj.kind,
                        location: Self::location_for(&id),
                    },
                );
            }
        }
        let count = fresh.len();
        *self.entries.write().expect("lock poisoned") = fresh;
        debug!(objects = count, "rebuilt scope index");
        Ok(count)
    }
}

impl Default for ScopeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScopeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeIndex")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_store::{Blob, InMemoryObjectStore};

    #[test]
    fn location_uses_two_level_sharding() {
        let id = ObjectId::from_bytes(b"shard me");
        let location = ScopeIndex::location_for(&id);
        let hex = id.to_hex();
        assert_eq!(location, format!("objects/{}/{}", &hex[..2], &hex[2..]));
    }

    #[test]
    fn note_and_get() {
        let index = ScopeIndex::new();
        let id = ObjectId::from_bytes(b"obj");
        index.note(id, ObjectKind::Blob);
        let entry = index.get(&id).unwrap();
        assert_eq!(entry.kind, ObjectKind::Blob);
        assert_eq!(entry.location, ScopeIndex::location_for(&id));
    }

    #[test]
    fn note_is_idempotent() {
        let index = ScopeIndex::new();
        let id = ObjectId::from_bytes(b"obj");
        index.note(id, ObjectKind::Blob);
        index.note(id, ObjectKind::Blob);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn forget_removes_entry() {
        let index = ScopeIndex::new();
        let id = ObjectId::from_bytes(b"obj");
        index.note(id, ObjectKind::Blob);
        assert!(index.forget(&id));
        assert!(index.get(&id).is_none());
        assert!(!index.forget(&id));
    }

    #[test]
    fn rebuild_matches_store_contents() {
        let store = InMemoryObjectStore::new();
        let a = store.write(&Blob::new(b"a".to_vec()).to_stored_object()).unwrap();
        let b = store.write(&Blob::new(b"b".to_vec()).to_stored_object()).unwrap();

        // A stale index with a dangling entry and a missing one.
        let index = ScopeIndex::new();
        index.note(ObjectId::from_bytes(b"gone"), ObjectKind::Blob);

        let count = index.rebuild(&store).unwrap();
        assert_eq!(count, 2);
        assert!(index.get(&a).is_some());
        assert!(index.get(&b).is_some());
        assert!(index.get(&ObjectId::from_bytes(b"gone")).is_none());
    }
}
