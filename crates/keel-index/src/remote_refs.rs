//! Remote-ref records: the head last observed per (remote scope, component).
//!
//! Remote refs are only updated by sync operations (import from an
//! authoritative scope, successful export), never directly. They exist to
//! detect divergence during sync, not to drive resolution.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use keel_types::{ComponentId, ObjectId};

/// A serializable remote-ref record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    /// Name of the remote scope this observation is about.
    pub remote: String,
    /// The component.
    pub id: ComponentId,
    /// The head object id last observed for that remote.
    pub head: ObjectId,
}

/// In-memory store of remote-ref records, one per (remote, component) pair.
pub struct RemoteRefs {
    refs: RwLock<BTreeMap<(String, ComponentId), ObjectId>>,
}

impl RemoteRefs {
    /// Create an empty remote-ref store.
    pub fn new() -> Self {
        Self {
            refs: RwLock::new(BTreeMap::new()),
        }
    }

    /// The observed head for a (remote, component) pair.
    pub fn get(&self, remote: &str, id: &ComponentId) -> Option<ObjectId> {
        self.refs
            .read()
            .expect("lock poisoned")
            .get(&(remote.to_string(), id.clone()))
            .copied()
    }

    /// Record an observed head, replacing any previous observation.
    pub fn set(&self, remote: &str, id: &ComponentId, head: ObjectId) {
        debug!(remote, component = %id, head = %head.short_hex(), "updating remote ref");
        self.refs
            .write()
            .expect("lock poisoned")
            .insert((remote.to_string(), id.clone()), head);
    }

    /// Drop an observation. Returns `true` if one existed.
    pub fn remove(&self, remote: &str, id: &ComponentId) -> bool {
        self.refs
            .write()
            .expect("lock poisoned")
            .remove(&(remote.to_string(), id.clone()))
            .is_some()
    }

    /// All records for one remote scope.
    pub fn for_remote(&self, remote: &str) -> Vec<RemoteRef> {
        self.refs
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|((r, _), _)| r == remote)
            .map(|((r, id), head)| RemoteRef {
                remote: r.clone(),
                id: id.clone(),
                head: *head,
            })
            .collect()
    }

    /// All records.
    pub fn all(&self) -> Vec<RemoteRef> {
        self.refs
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|((r, id), head)| RemoteRef {
                remote: r.clone(),
                id: id.clone(),
                head: *head,
            })
            .collect()
    }
}

impl Default for RemoteRefs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RemoteRefs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRefs")
            .field("records", &self.refs.read().expect("lock poisoned").len())
            .finish()
    }
}
