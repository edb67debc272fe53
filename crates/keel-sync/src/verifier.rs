use std::collections::HashSet;

use tracing::debug;

use keel_store::{ObjectKind, VersionObject};
use keel_types::ObjectId;

use crate::error::{SyncError, SyncResult};
use crate::types::{ComponentPayload, ExportPayload};

/// Receive-side payload verification.
///
/// Negotiation means a payload may legitimately omit objects the receiver
/// already holds, so this checks internal consistency only: the manifest
/// must match its wire checksum, no manifest may smuggle orphaned entries
/// across the scope boundary, and every carried version record must decode
/// and be referenced by its component's manifest.
pub struct PayloadVerifier;

impl PayloadVerifier {
    /// Verify a payload, returning the number of objects checked.
    pub fn verify(payload: &ExportPayload) -> SyncResult<usize> {
        let mut checked = 0usize;
        for component in &payload.components {
            let manifest = &component.manifest;
            // Orphans are scope-local state and never travel.
            if !manifest.orphaned_versions.is_empty() {
                return Err(SyncError::CorruptPayload {
                    id: manifest.head.unwrap_or_else(ObjectId::null),
                    reason: format!(
                        "payload manifest for {} carries orphaned versions",
                        manifest.id
                    ),
                });
            }
            if ComponentPayload::checksum_of(manifest)? != component.checksum {
                return Err(SyncError::CorruptPayload {
                    id: manifest.head.unwrap_or_else(ObjectId::null),
                    reason: format!("manifest for {} fails its checksum", manifest.id),
                });
            }
            let referenced: HashSet<ObjectId> = manifest.versions.values().copied().collect();
            for object in &component.objects {
                let id = object.compute_id();
                if object.kind == ObjectKind::Version {
                    VersionObject::from_stored_object(object).map_err(|e| {
                        SyncError::CorruptPayload {
                            id,
                            reason: e.to_string(),
                        }
                    })?;
                    // Exports carry exactly the canonical snapshots.
                    if !referenced.contains(&id) {
                        return Err(SyncError::CorruptPayload {
                            id,
                            reason: format!(
                                "version record not referenced by the manifest for {}",
                                manifest.id
                            ),
                        });
                    }
                }
                checked += 1;
            }
        }
        debug!(objects = checked, "verified incoming payload");
        Ok(checked)
    }
}
