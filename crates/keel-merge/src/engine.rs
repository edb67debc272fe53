//! The manifest merge engine.
//!
//! [`merge_manifests`] is a pure function over (local manifest, incoming
//! manifest, intent, object store): it never mutates scope state itself.
//! Callers apply the returned manifest under their per-component critical
//! section, which keeps merges commutative and associative with respect to
//! arrival order — the ancestry tests, not the ordering of fetches, decide
//! every outcome.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use keel_index::ComponentManifest;
use keel_store::ObjectStore;
use keel_types::{ObjectId, VersionLabel};

use crate::error::{MergeError, MergeResult};
use crate::history::{is_ancestor, related};

/// Where the incoming manifest came from, which decides who is canonical.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeIntent {
    /// Fetched from the component's own authoritative scope: the incoming
    /// side is canonical and determines `versions` and `head`.
    Origin,
    /// Carried as a cache by a dependent: the locally known history stays
    /// canonical; disconnected incoming labels become orphans.
    Cache,
    /// Received via export: incoming must fast-forward the local canonical
    /// history or the whole transfer is rejected.
    Push,
}

/// The explicit, tagged result of a merge. Never an exception: callers
/// handle the linear and the diverged case explicitly, and outcomes can be
/// reported across process boundaries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeOutcome {
    /// The incoming history was already fully known.
    Unchanged,
    /// Histories merged without divergence.
    Linear { head: Option<ObjectId> },
    /// No common snapshot for at least one label: the canonical side kept
    /// the label and the head; the divergent ids were preserved under
    /// `orphaned_versions`.
    Diverged {
        head: Option<ObjectId>,
        orphaned: Vec<(VersionLabel, ObjectId)>,
    },
}

/// Merge an incoming manifest into the locally known one.
///
/// Both sides' version objects must already be present in `store` (object
/// transfer precedes manifest application); ids whose objects are absent
/// simply contribute no ancestry and are treated as unrelated.
pub fn merge_manifests(
    store: &dyn ObjectStore,
    local: Option<&ComponentManifest>,
    incoming: &ComponentManifest,
    intent: MergeIntent,
) -> MergeResult<(ComponentManifest, MergeOutcome)> {
    let Some(local) = local else {
        // First contact: adopt the incoming history wholesale. Orphans never
        // travel, so the incoming manifest is canonical-only by construction.
        debug!(component = %incoming.id, intent = ?intent, "adopting incoming manifest");
        return Ok((
            incoming.canonical(),
            MergeOutcome::Linear {
                head: incoming.head,
            },
        ));
    };
    if local.is_empty() && local.head.is_none() {
        return Ok((
            incoming.canonical(),
            MergeOutcome::Linear {
                head: incoming.head,
            },
        ));
    }

    match intent {
        MergeIntent::Origin => merge_from_origin(store, local, incoming),
        MergeIntent::Cache => merge_from_cache(store, local, incoming),
        MergeIntent::Push => merge_push(store, local, incoming),
    }
}

/// Incoming is canonical: its labels and head win; local labels that no
/// longer connect to the canonical history move to `orphaned_versions`.
fn merge_from_origin(
    store: &dyn ObjectStore,
    local: &ComponentManifest,
    incoming: &ComponentManifest,
) -> MergeResult<(ComponentManifest, MergeOutcome)> {
    let mut merged = local.clone();
    let mut changed = false;
    let mut orphaned: Vec<(VersionLabel, ObjectId)> = Vec::new();

    for (label, incoming_id) in &incoming.versions {
        match merged.lookup(label) {
            Some((known, false)) if known == *incoming_id => {}
            Some((known, true)) if known == *incoming_id => {
                // The authoritative scope re-asserts a snapshot we had
                // orphaned: canonical supersession promotes it back.
                merged.promote_orphan(label);
                changed = true;
            }
            Some((known, _)) => {
                if !related(store, &known, incoming_id)? {
                    // Same label, two unrelated ids. The label is exclusive,
                    // so the losing id leaves the manifest; its object stays
                    // in the store, content-addressed and harmless.
                    warn!(
                        component = %merged.id, label = %label,
                        kept = %incoming_id.short_hex(), dropped = %known.short_hex(),
                        "label reissued by authoritative scope with unrelated history"
                    );
                }
                merged.assign_version(*label, *incoming_id);
                changed = true;
            }
            None => {
                merged.assign_version(*label, *incoming_id);
                changed = true;
            }
        }
    }

    // Head: canonical head wins unless the local history strictly extends it.
    match (merged.head, incoming.head) {
        (Some(local_head), Some(incoming_head)) if local_head != incoming_head => {
            if !is_ancestor(store, &incoming_head, &local_head)? {
                merged.head = Some(incoming_head);
                changed = true;
            }
        }
        (None, Some(incoming_head)) => {
            merged.head = Some(incoming_head);
            changed = true;
        }
        _ => {}
    }

    // Local-only labels that share no snapshot with the canonical head are
    // the divergent cached copies this engine exists to reconcile.
    if let Some(head) = merged.head {
        let local_only: Vec<VersionLabel> = merged
            .versions
            .keys()
            .filter(|label| !incoming.versions.contains_key(label))
            .copied()
            .collect();
        for label in local_only {
            let id = merged.versions[&label];
            if id != head && !related(store, &id, &head)? {
                merged.orphan_version(&label);
                orphaned.push((label, id));
                changed = true;
            }
        }
    }

    Ok(finish(merged, changed, orphaned))
}

/// Incoming was carried as a dependent's cache: local canonical state wins;
/// unknown labels join the history only if they connect to it.
fn merge_from_cache(
    store: &dyn ObjectStore,
    local: &ComponentManifest,
    incoming: &ComponentManifest,
) -> MergeResult<(ComponentManifest, MergeOutcome)> {
    let mut merged = local.clone();
    let mut changed = false;
    let mut orphaned: Vec<(VersionLabel, ObjectId)> = Vec::new();

    for (label, incoming_id) in &incoming.versions {
        match merged.lookup(label) {
            // Already known under this label — canonical or already
            // orphaned. Re-importing an orphan must not duplicate it into
            // `versions`, so an orphaned match stays where it is.
            Some((known, _)) if known == *incoming_id => {}
            Some((known, _)) => {
                warn!(
                    component = %merged.id, label = %label,
                    kept = %known.short_hex(), ignored = %incoming_id.short_hex(),
                    "cached copy contradicts known binding; keeping local"
                );
            }
            None => {
                let connected = match merged.head {
                    None => true,
                    Some(head) => related(store, incoming_id, &head)?,
                };
                if connected {
                    merged.assign_version(*label, *incoming_id);
                } else if merged.insert_orphan(*label, *incoming_id) {
                    orphaned.push((*label, *incoming_id));
                }
                changed = true;
            }
        }
    }

    // A cache may know a newer canonical head, but only a strict descendant
    // of ours is trusted to advance it.
    match (merged.head, incoming.head) {
        (Some(local_head), Some(incoming_head)) if local_head != incoming_head => {
            if is_ancestor(store, &local_head, &incoming_head)? {
                merged.head = Some(incoming_head);
                changed = true;
            }
        }
        (None, Some(incoming_head)) => {
            merged.head = Some(incoming_head);
            changed = true;
        }
        _ => {}
    }

    Ok(finish(merged, changed, orphaned))
}

/// Incoming arrives via export: fast-forward only, atomic failure otherwise.
fn merge_push(
    store: &dyn ObjectStore,
    local: &ComponentManifest,
    incoming: &ComponentManifest,
) -> MergeResult<(ComponentManifest, MergeOutcome)> {
    let mut merged = local.clone();
    let mut changed = false;

    for (label, incoming_id) in &incoming.versions {
        match merged.lookup(label) {
            Some((known, false)) if known == *incoming_id => {}
            Some((known, true)) if known == *incoming_id => {
                return Err(MergeError::Conflict {
                    component: merged.id.clone(),
                    label: Some(*label),
                    reason: "pushed version is recorded as divergent on the receiving scope"
                        .into(),
                });
            }
            Some(_) => {
                return Err(MergeError::Conflict {
                    component: merged.id.clone(),
                    label: Some(*label),
                    reason: "label already bound to different history".into(),
                });
            }
            None => {
                let connected = match local.head {
                    None => true,
                    Some(head) => related(store, incoming_id, &head)?,
                };
                if !connected {
                    return Err(MergeError::Conflict {
                        component: merged.id.clone(),
                        label: Some(*label),
                        reason: "pushed history shares no common snapshot with the canonical history".into(),
                    });
                }
                merged.assign_version(*label, *incoming_id);
                changed = true;
            }
        }
    }

    match (merged.head, incoming.head) {
        (Some(local_head), Some(incoming_head)) if local_head != incoming_head => {
            if is_ancestor(store, &local_head, &incoming_head)? {
                merged.head = Some(incoming_head);
                changed = true;
            } else if !is_ancestor(store, &incoming_head, &local_head)? {
                return Err(MergeError::Conflict {
                    component: merged.id.clone(),
                    label: None,
                    reason: "pushed head does not fast-forward the canonical head".into(),
                });
            }
        }
        (None, Some(incoming_head)) => {
            merged.head = Some(incoming_head);
            changed = true;
        }
        _ => {}
    }

    Ok(finish(merged, changed, Vec::new()))
}

fn finish(
    merged: ComponentManifest,
    changed: bool,
    orphaned: Vec<(VersionLabel, ObjectId)>,
) -> (ComponentManifest, MergeOutcome) {
    let outcome = if !orphaned.is_empty() {
        debug!(component = %merged.id, orphans = orphaned.len(), "merge diverged");
        MergeOutcome::Diverged {
            head: merged.head,
            orphaned,
        }
    } else if changed {
        MergeOutcome::Linear { head: merged.head }
    } else {
        MergeOutcome::Unchanged
    };
    (merged, outcome)
}
