use serde::{Deserialize, Serialize};

use keel_index::ComponentManifest;
use keel_store::StoredObject;
use keel_types::{ContentHasher, ObjectId};

use crate::error::SyncResult;

/// One component's share of a transfer: the manifest as the sender asserts
/// it, plus the objects backing it that the receiver is believed to lack.
///
/// The manifest is always the sender's canonical projection — orphaned
/// entries never cross a scope boundary. How the receiver folds the
/// manifest in depends on whose component it is: its own scope's components
/// merge as a push, foreign components merge as cache material.
///
/// Objects verify themselves through their content ids; the mutable
/// manifest has no intrinsic id, so it travels with a checksum instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentPayload {
    pub manifest: ComponentManifest,
    pub objects: Vec<StoredObject>,
    pub checksum: ObjectId,
}

impl ComponentPayload {
    pub fn new(manifest: ComponentManifest, objects: Vec<StoredObject>) -> SyncResult<Self> {
        let checksum = Self::checksum_of(&manifest)?;
        Ok(Self {
            manifest,
            objects,
            checksum,
        })
    }

    /// Domain-separated checksum over the serialized manifest.
    pub fn checksum_of(manifest: &ComponentManifest) -> SyncResult<ObjectId> {
        let bytes = serde_json::to_vec(manifest)?;
        Ok(ContentHasher::MANIFEST.hash(&bytes))
    }

    /// Content ids of every carried object.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.iter().map(|o| o.compute_id()).collect()
    }
}

/// A full export: the pushed components and the dependency components that
/// travel with them so the receiving scope becomes a self-sufficient cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub components: Vec<ComponentPayload>,
}

impl ExportPayload {
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.components.iter().map(|c| c.objects.len()).sum()
    }
}

/// What the remote reports after accepting a push.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    /// Components merged into the remote's own history.
    pub accepted: Vec<keel_types::ComponentId>,
    /// Foreign components folded in as cache material.
    pub cached: Vec<keel_types::ComponentId>,
    /// Objects newly written to the remote store.
    pub objects_received: usize,
}

/// The outcome of transfer negotiation against one remote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Negotiation {
    /// Candidate objects the remote lacks and must be sent.
    pub wants: Vec<ObjectId>,
    /// Candidate objects the remote already holds.
    pub common: Vec<ObjectId>,
}
