//! Ancestry traversal over version parent chains.
//!
//! All traversal is iterative with an explicit queue and a visited set, so
//! deep histories never recurse and shared ancestors are visited once.
//! Objects missing from the store terminate their branch of the walk:
//! recovery logic must tolerate out-of-band deletion, and an unreachable
//! parent simply contributes no ancestors.

use std::collections::{HashSet, VecDeque};

use keel_store::{ObjectKind, ObjectStore, VersionObject};
use keel_types::ObjectId;

use crate::error::MergeResult;

/// The ancestor set of a version object, including the object itself.
pub fn ancestors(store: &dyn ObjectStore, id: &ObjectId) -> MergeResult<HashSet<ObjectId>> {
    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut queue: VecDeque<ObjectId> = VecDeque::new();
    queue.push_back(*id);

    while let Some(current) = queue.pop_front() {
        if !seen.insert(current) {
            continue;
        }
        let Some(obj) = store.read(&current)? else {
            // Deleted or never transferred; end of this branch.
            continue;
        };
        if obj.kind != ObjectKind::Version {
            continue;
        }
        let version = VersionObject::from_stored_object(&obj)?;
        for parent in &version.parents {
            if !seen.contains(parent) {
                queue.push_back(*parent);
            }
        }
    }
    Ok(seen)
}

/// Returns `true` if `ancestor` appears in the parent chain of `descendant`
/// (a version is considered its own ancestor).
pub fn is_ancestor(
    store: &dyn ObjectStore,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> MergeResult<bool> {
    if ancestor == descendant {
        return Ok(true);
    }
    Ok(ancestors(store, descendant)?.contains(ancestor))
}

/// Returns `true` if the two histories share at least one common snapshot.
///
/// This is the "common ancestor" test the reconciliation policy keys on:
/// two unrelated incarnations of a component share nothing, while any two
/// points of one history share at least their root.
pub fn related(store: &dyn ObjectStore, a: &ObjectId, b: &ObjectId) -> MergeResult<bool> {
    if a == b {
        return Ok(true);
    }
    let ancestors_a = ancestors(store, a)?;
    // Walk b's chain lazily instead of materializing both sets.
    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut queue: VecDeque<ObjectId> = VecDeque::new();
    queue.push_back(*b);
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current) {
            continue;
        }
        if ancestors_a.contains(&current) {
            return Ok(true);
        }
        let Some(obj) = store.read(&current)? else {
            continue;
        };
        if obj.kind != ObjectKind::Version {
            continue;
        }
        let version = VersionObject::from_stored_object(&obj)?;
        for parent in &version.parents {
            if !seen.contains(parent) {
                queue.push_back(*parent);
            }
        }
    }
    Ok(false)
}
