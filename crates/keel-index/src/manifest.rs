//! Per-component manifests: versions, head, and orphaned versions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use keel_types::{ComponentId, ObjectId, VersionLabel};

use crate::error::{IndexError, IndexResult};

/// Conceptual sync state of a component manifest, derived from its contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// No history recorded yet.
    Uninitialized,
    /// All known labels belong to the canonical history graph.
    Synced,
    /// At least one label diverged from the canonical history and was
    /// preserved under `orphaned_versions`. Divergence is recorded
    /// permanently unless superseded by a later canonical export.
    Diverged,
}

/// A component's version bookkeeping within one scope.
///
/// Invariants:
/// - A label appears in exactly one of `versions` or `orphaned_versions`.
/// - `head`, when set, resolves to an object reachable by following the
///   version history's parent chain from itself. Orphaned entries are
///   explicitly *not* required to be reachable from `head`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentManifest {
    /// The component this manifest describes.
    pub id: ComponentId,
    /// Canonical versions: label to version object id.
    pub versions: BTreeMap<VersionLabel, ObjectId>,
    /// The object id considered canonical/latest.
    pub head: Option<ObjectId>,
    /// Versions present in the object store but excluded from the canonical
    /// history graph, preserved for traceability.
    pub orphaned_versions: BTreeMap<VersionLabel, ObjectId>,
}

impl ComponentManifest {
    /// Create an empty manifest for a component.
    pub fn new(id: ComponentId) -> Self {
        Self {
            id,
            versions: BTreeMap::new(),
            head: None,
            orphaned_versions: BTreeMap::new(),
        }
    }

    /// Returns `true` if no version is recorded at all.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.orphaned_versions.is_empty()
    }

    /// The derived sync state.
    pub fn sync_state(&self) -> SyncState {
        if self.is_empty() && self.head.is_none() {
            SyncState::Uninitialized
        } else if self.orphaned_versions.is_empty() {
            SyncState::Synced
        } else {
            SyncState::Diverged
        }
    }

    /// The canonical object id for a label, if the label is canonical.
    pub fn version(&self, label: &VersionLabel) -> Option<ObjectId> {
        self.versions.get(label).copied()
    }

    /// Look up a label in either map.
    ///
    /// Returns the object id and whether it came from `orphaned_versions`.
    /// Orphaned entries still resolve here: a dependent that pinned the
    /// orphaned snapshot must keep materializing against it.
    pub fn lookup(&self, label: &VersionLabel) -> Option<(ObjectId, bool)> {
        if let Some(id) = self.versions.get(label) {
            return Some((*id, false));
        }
        self.orphaned_versions.get(label).map(|id| (*id, true))
    }

    /// The canonical label pointing at `id`, if any.
    pub fn label_of(&self, id: &ObjectId) -> Option<VersionLabel> {
        self.versions
            .iter()
            .find(|(_, v)| *v == id)
            .map(|(label, _)| *label)
    }

    /// The label of the current head, if the head is labeled.
    pub fn head_label(&self) -> Option<VersionLabel> {
        self.head.as_ref().and_then(|h| self.label_of(h))
    }

    /// The highest canonical label, used for auto-bumping at tag time.
    pub fn latest_label(&self) -> Option<VersionLabel> {
        self.versions.keys().next_back().copied()
    }

    /// Record a new canonical version under a previously unused label.
    ///
    /// Fails if the label is already taken in either map: a label is
    /// exclusive to one of the two maps at all times.
    pub fn record_version(&mut self, label: VersionLabel, id: ObjectId) -> IndexResult<()> {
        if self.versions.contains_key(&label) || self.orphaned_versions.contains_key(&label) {
            return Err(IndexError::VersionExists {
                component: self.id.clone(),
                label,
            });
        }
        self.versions.insert(label, id);
        Ok(())
    }

    /// Force a label to a canonical id, displacing any previous binding of
    /// that label in either map. Used by the merge engine when canonical
    /// history reassigns a label.
    pub fn assign_version(&mut self, label: VersionLabel, id: ObjectId) {
        self.orphaned_versions.remove(&label);
        self.versions.insert(label, id);
    }

    /// Move a canonical label into `orphaned_versions`.
    ///
    /// No-op if the label is not canonical. Returns the orphaned id.
    pub fn orphan_version(&mut self, label: &VersionLabel) -> Option<ObjectId> {
        let id = self.versions.remove(label)?;
        warn!(component = %self.id, label = %label, id = %id.short_hex(), "orphaning divergent version");
        self.orphaned_versions.insert(*label, id);
        Some(id)
    }

    /// Record an orphan for a label not otherwise known.
    ///
    /// Returns `false` (and records nothing) if the label is already bound
    /// in `versions` — the canonical binding wins and exclusivity holds.
    pub fn insert_orphan(&mut self, label: VersionLabel, id: ObjectId) -> bool {
        if self.versions.contains_key(&label) {
            return false;
        }
        self.orphaned_versions.insert(label, id);
        true
    }

    /// Promote an orphaned label back into `versions`.
    ///
    /// Used when the authoritative scope re-asserts the orphaned snapshot
    /// as canonical. Returns the promoted id.
    pub fn promote_orphan(&mut self, label: &VersionLabel) -> Option<ObjectId> {
        let id = self.orphaned_versions.remove(label)?;
        self.versions.insert(*label, id);
        Some(id)
    }

    /// The canonical projection of this manifest: versions and head only.
    ///
    /// This is what leaves the scope during export. Orphaned entries never
    /// propagate; a receiving scope records divergence only if it derives
    /// it independently.
    pub fn canonical(&self) -> Self {
        Self {
            id: self.id.clone(),
            versions: self.versions.clone(),
            head: self.head,
            orphaned_versions: BTreeMap::new(),
        }
    }

    /// Every object id referenced by this manifest, canonical first.
    pub fn all_version_ids(&self) -> Vec<ObjectId> {
        self.versions
            .values()
            .chain(self.orphaned_versions.values())
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comp() -> ComponentId {
        ComponentId::new("scope-b", "comp3")
    }

    fn oid(tag: &[u8]) -> ObjectId {
        ObjectId::from_bytes(tag)
    }

    #[test]
    fn new_manifest_is_uninitialized() {
        let m = ComponentManifest::new(comp());
        assert_eq!(m.sync_state(), SyncState::Uninitialized);
        assert!(m.is_empty());
    }

    #[test]
    fn record_and_lookup() {
        let mut m = ComponentManifest::new(comp());
        let id = oid(b"v1");
        m.record_version(VersionLabel::first(), id).unwrap();
        m.head = Some(id);
        assert_eq!(m.version(&VersionLabel::first()), Some(id));
        assert_eq!(m.lookup(&VersionLabel::first()), Some((id, false)));
        assert_eq!(m.head_label(), Some(VersionLabel::first()));
        assert_eq!(m.sync_state(), SyncState::Synced);
    }

    #[test]
    fn record_rejects_duplicate_label() {
        let mut m = ComponentManifest::new(comp());
        m.record_version(VersionLabel::first(), oid(b"v1")).unwrap();
        assert!(matches!(
            m.record_version(VersionLabel::first(), oid(b"v1-again")),
            Err(IndexError::VersionExists { .. })
        ));
    }

    #[test]
    fn record_rejects_label_held_by_orphan() {
        let mut m = ComponentManifest::new(comp());
        assert!(m.insert_orphan(VersionLabel::first(), oid(b"orphan")));
        assert!(m
            .record_version(VersionLabel::first(), oid(b"fresh"))
            .is_err());
    }

    #[test]
    fn orphan_moves_label_exclusively() {
        let mut m = ComponentManifest::new(comp());
        let id = oid(b"v1");
        m.record_version(VersionLabel::first(), id).unwrap();
        assert_eq!(m.orphan_version(&VersionLabel::first()), Some(id));
        assert!(m.versions.is_empty());
        assert_eq!(m.lookup(&VersionLabel::first()), Some((id, true)));
        assert_eq!(m.sync_state(), SyncState::Diverged);
    }

    #[test]
    fn insert_orphan_never_shadows_canonical() {
        let mut m = ComponentManifest::new(comp());
        m.record_version(VersionLabel::first(), oid(b"canonical")).unwrap();
        assert!(!m.insert_orphan(VersionLabel::first(), oid(b"stale")));
        assert!(m.orphaned_versions.is_empty());
    }

    #[test]
    fn promote_orphan_restores_canonical_binding() {
        let mut m = ComponentManifest::new(comp());
        let id = oid(b"v1");
        m.insert_orphan(VersionLabel::first(), id);
        assert_eq!(m.promote_orphan(&VersionLabel::first()), Some(id));
        assert_eq!(m.version(&VersionLabel::first()), Some(id));
        assert!(m.orphaned_versions.is_empty());
    }

    #[test]
    fn assign_version_displaces_orphan() {
        let mut m = ComponentManifest::new(comp());
        m.insert_orphan(VersionLabel::first(), oid(b"stale"));
        m.assign_version(VersionLabel::first(), oid(b"canonical"));
        assert_eq!(m.version(&VersionLabel::first()), Some(oid(b"canonical")));
        assert!(m.orphaned_versions.is_empty());
    }

    #[test]
    fn canonical_projection_strips_orphans() {
        let mut m = ComponentManifest::new(comp());
        let head = oid(b"v2");
        m.record_version(VersionLabel::new(0, 0, 2), head).unwrap();
        m.head = Some(head);
        m.insert_orphan(VersionLabel::first(), oid(b"stale"));
        let canonical = m.canonical();
        assert!(canonical.orphaned_versions.is_empty());
        assert_eq!(canonical.head, Some(head));
        assert_eq!(canonical.versions.len(), 1);
    }

    #[test]
    fn latest_label_orders_numerically() {
        let mut m = ComponentManifest::new(comp());
        m.record_version("0.0.9".parse().unwrap(), oid(b"v9")).unwrap();
        m.record_version("0.0.10".parse().unwrap(), oid(b"v10")).unwrap();
        assert_eq!(m.latest_label(), Some("0.0.10".parse().unwrap()));
    }

    #[test]
    fn serde_roundtrip() {
        let mut m = ComponentManifest::new(comp());
        let id = oid(b"v1");
        m.record_version(VersionLabel::first(), id).unwrap();
        m.head = Some(id);
        let json = serde_json::to_string(&m).unwrap();
        let parsed: ComponentManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, m);
    }
}
