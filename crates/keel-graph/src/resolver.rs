//! The layered dependency resolver.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use keel_index::ComponentManifest;
use keel_store::{StoredObject, VersionObject};
use keel_types::{ComponentId, ComponentRef, ObjectId, VersionLabel};

use crate::error::{GraphError, GraphResult, RefList, TargetList};
use crate::source::ObjectSource;

/// An explicitly requested import: a component, optionally pinned to a
/// version. Without a pin the source's head decides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportTarget {
    pub id: ComponentId,
    pub version: Option<VersionLabel>,
}

impl ImportTarget {
    pub fn new(id: ComponentId) -> Self {
        Self { id, version: None }
    }

    pub fn pinned(id: ComponentId, version: VersionLabel) -> Self {
        Self {
            id,
            version: Some(version),
        }
    }
}

impl fmt::Display for ImportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}@{}", self.id, v),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Which source satisfied a reference. Decides the merge intent downstream:
/// origin-fetched manifests are canonical, cache-fetched ones are not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Already present in the local scope.
    Local,
    /// Fetched from the component's own authoritative scope.
    Origin { scope: String },
    /// Fetched from a dependent's scope holding it as a cache.
    Cache { scope: String },
}

impl Provenance {
    pub fn is_origin(&self) -> bool {
        matches!(self, Provenance::Origin { .. })
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Provenance::Local)
    }
}

/// A fully resolved reference: the manifest as the winning source knows it,
/// the version record, and every transferred object backing them.
#[derive(Clone, Debug)]
pub struct ResolvedComponent {
    /// The reference, with a concrete version label.
    pub target: ComponentRef,
    /// The winning source's manifest for the component.
    pub manifest: ComponentManifest,
    /// Id of the resolved version object.
    pub version_id: ObjectId,
    /// The decoded version record.
    pub version: VersionObject,
    /// Objects fetched from the source (empty for local hits).
    pub objects: Vec<StoredObject>,
    /// Which source won.
    pub provenance: Provenance,
}

/// The outcome of a batch resolution.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Everything that resolved, in traversal order.
    pub components: Vec<ResolvedComponent>,
    /// References no source could satisfy, deduplicated and sorted.
    pub missing: Vec<ComponentRef>,
}

/// The resolver: one local source plus a registry of remote sources keyed
/// by scope name.
pub struct Resolver {
    local: Arc<dyn ObjectSource>,
    remotes: HashMap<String, Arc<dyn ObjectSource>>,
}

impl Resolver {
    pub fn new(
        local: Arc<dyn ObjectSource>,
        remotes: HashMap<String, Arc<dyn ObjectSource>>,
    ) -> Self {
        Self { local, remotes }
    }

    /// Resolve a batch of explicit import targets plus their dependency
    /// closures.
    ///
    /// Transitively missing references are collected, not fatal. A target
    /// absent from its authoritative scope *and* every fallback is fatal:
    /// no reconciliation is possible for it, and every such target is
    /// enumerated in the error.
    pub async fn resolve_import(&self, targets: &[ImportTarget]) -> GraphResult<Resolution> {
        let mut components: Vec<ResolvedComponent> = Vec::new();
        let mut visited: HashSet<ComponentRef> = HashSet::new();
        let mut queue: VecDeque<(ComponentRef, Vec<String>)> = VecDeque::new();
        let mut not_found: Vec<ImportTarget> = Vec::new();

        for target in targets {
            match self.resolve_target(target).await? {
                Some(resolved) => {
                    visited.insert(resolved.target.clone());
                    enqueue_flattened(&mut queue, &resolved);
                    components.push(resolved);
                }
                None => not_found.push(target.clone()),
            }
        }
        if !not_found.is_empty() {
            return Err(GraphError::ComponentNotFound(TargetList::new(not_found)));
        }

        let missing = self.drain_queue(&mut queue, &mut visited, &mut components).await?;
        Ok(Resolution {
            components,
            missing,
        })
    }

    /// Resolve the dependency closure needed to tag a new version with the
    /// given direct dependencies. All-or-nothing: any unresolvable
    /// reference fails the whole call with the complete list, because a
    /// canonical history must not reference unreachable objects.
    pub async fn resolve_dependencies(&self, direct: &[ComponentRef]) -> GraphResult<Resolution> {
        let mut components: Vec<ResolvedComponent> = Vec::new();
        let mut visited: HashSet<ComponentRef> = HashSet::new();
        let mut queue: VecDeque<(ComponentRef, Vec<String>)> = VecDeque::new();

        for dep in direct {
            // A sibling's scope may hold the dep as cache.
            let carriers: Vec<String> = direct
                .iter()
                .filter(|other| *other != dep)
                .map(|other| other.id.scope.clone())
                .collect();
            queue.push_back((dep.clone(), carriers));
        }

        let missing = self.drain_queue(&mut queue, &mut visited, &mut components).await?;
        if !missing.is_empty() {
            return Err(GraphError::MissingDependencies(RefList::new(missing)));
        }
        Ok(Resolution {
            components,
            missing: Vec::new(),
        })
    }

    async fn drain_queue(
        &self,
        queue: &mut VecDeque<(ComponentRef, Vec<String>)>,
        visited: &mut HashSet<ComponentRef>,
        components: &mut Vec<ResolvedComponent>,
    ) -> GraphResult<Vec<ComponentRef>> {
        let mut missing: Vec<ComponentRef> = Vec::new();
        while let Some((reference, carriers)) = queue.pop_front() {
            if !visited.insert(reference.clone()) {
                continue;
            }
            match self.probe(&reference, &carriers).await? {
                Some(resolved) => {
                    enqueue_flattened(queue, &resolved);
                    components.push(resolved);
                }
                None => {
                    warn!(reference = %reference, "unresolvable from any source");
                    missing.push(reference);
                }
            }
        }
        missing.sort();
        missing.dedup();
        Ok(missing)
    }

    /// Probe an explicit target: authoritative scope first (canonical),
    /// then the local scope, then every other known remote as a cache.
    async fn resolve_target(&self, target: &ImportTarget) -> GraphResult<Option<ResolvedComponent>> {
        if let Some(source) = self.remotes.get(&target.id.scope) {
            let provenance = Provenance::Origin {
                scope: target.id.scope.clone(),
            };
            if let Some(resolved) = self
                .materialize(source.as_ref(), provenance, &target.id, target.version)
                .await?
            {
                return Ok(Some(resolved));
            }
        }
        if let Some(resolved) = self
            .materialize(
                self.local.as_ref(),
                Provenance::Local,
                &target.id,
                target.version,
            )
            .await?
        {
            return Ok(Some(resolved));
        }
        let mut names: Vec<&String> = self
            .remotes
            .keys()
            .filter(|name| **name != target.id.scope)
            .collect();
        names.sort();
        for name in names {
            let source = &self.remotes[name];
            let provenance = Provenance::Cache {
                scope: name.clone(),
            };
            if let Some(resolved) = self
                .materialize(source.as_ref(), provenance, &target.id, target.version)
                .await?
            {
                return Ok(Some(resolved));
            }
        }
        Ok(None)
    }

    /// Probe a dependency reference: local scope, then the carrying
    /// dependents' scopes in order, then the authoritative scope.
    async fn probe(
        &self,
        reference: &ComponentRef,
        carriers: &[String],
    ) -> GraphResult<Option<ResolvedComponent>> {
        if let Some(resolved) = self
            .materialize(
                self.local.as_ref(),
                Provenance::Local,
                &reference.id,
                Some(reference.version),
            )
            .await?
        {
            return Ok(Some(resolved));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for carrier in carriers {
            if carrier == &reference.id.scope || !seen.insert(carrier.as_str()) {
                continue;
            }
            let Some(source) = self.remotes.get(carrier) else {
                continue;
            };
            let provenance = Provenance::Cache {
                scope: carrier.clone(),
            };
            if let Some(resolved) = self
                .materialize(
                    source.as_ref(),
                    provenance,
                    &reference.id,
                    Some(reference.version),
                )
                .await?
            {
                debug!(reference = %reference, carrier, "recovered from dependent's cache");
                return Ok(Some(resolved));
            }
        }

        if let Some(source) = self.remotes.get(&reference.id.scope) {
            let provenance = Provenance::Origin {
                scope: reference.id.scope.clone(),
            };
            if let Some(resolved) = self
                .materialize(
                    source.as_ref(),
                    provenance,
                    &reference.id,
                    Some(reference.version),
                )
                .await?
            {
                return Ok(Some(resolved));
            }
        }

        // Last resort: any other known scope may hold the reference as a
        // cache even if no dependent pointed us at it.
        let mut names: Vec<&String> = self
            .remotes
            .keys()
            .filter(|name| **name != reference.id.scope && !carriers.contains(*name))
            .collect();
        names.sort();
        for name in names {
            let source = &self.remotes[name];
            let provenance = Provenance::Cache {
                scope: name.clone(),
            };
            if let Some(resolved) = self
                .materialize(
                    source.as_ref(),
                    provenance,
                    &reference.id,
                    Some(reference.version),
                )
                .await?
            {
                debug!(reference = %reference, scope = %name, "recovered from unrelated scope cache");
                return Ok(Some(resolved));
            }
        }
        Ok(None)
    }

    /// Fetch everything needed to materialize one reference from one
    /// source: the manifest, the version record, its payload blobs, and —
    /// for remote hits — the rest of the manifest's history objects so the
    /// merge engine can detect common snapshots later.
    async fn materialize(
        &self,
        source: &dyn ObjectSource,
        provenance: Provenance,
        id: &ComponentId,
        version: Option<VersionLabel>,
    ) -> GraphResult<Option<ResolvedComponent>> {
        let Some(manifest) = source.manifest(id).await? else {
            return Ok(None);
        };
        let Some(label) = version
            .or_else(|| manifest.head_label())
            .or_else(|| manifest.latest_label())
        else {
            return Ok(None);
        };
        let Some((version_id, _orphaned)) = manifest.lookup(&label) else {
            return Ok(None);
        };
        let Some(version_obj) = source.object(&version_id).await? else {
            return Ok(None);
        };
        let version = VersionObject::from_stored_object(&version_obj)?;

        let mut objects: Vec<StoredObject> = Vec::new();
        if !provenance.is_local() {
            let mut fetched: HashSet<ObjectId> = HashSet::new();
            fetched.insert(version_id);
            objects.push(version_obj);
            for file in &version.files {
                if let Some(blob) = fetch_once(source, &mut fetched, &file.blob).await? {
                    objects.push(blob);
                }
            }
            // Carry the labeled history so ancestry checks can run locally.
            for other_id in manifest.all_version_ids() {
                let Some(obj) = fetch_once(source, &mut fetched, &other_id).await? else {
                    continue;
                };
                if let Ok(other) = VersionObject::from_stored_object(&obj) {
                    for file in &other.files {
                        if let Some(blob) = fetch_once(source, &mut fetched, &file.blob).await? {
                            objects.push(blob);
                        }
                    }
                }
                objects.push(obj);
            }
        }

        Ok(Some(ResolvedComponent {
            target: id.at(label),
            manifest,
            version_id,
            version,
            objects,
            provenance,
        }))
    }
}

async fn fetch_once(
    source: &dyn ObjectSource,
    fetched: &mut HashSet<ObjectId>,
    id: &ObjectId,
) -> GraphResult<Option<StoredObject>> {
    if !fetched.insert(*id) {
        return Ok(None);
    }
    source.object(id).await
}

/// Queue a resolved component's flattened dependencies, carrying the scopes
/// that may hold them as cache: the dependent's own scope first, then the
/// scopes of the sibling flattened deps.
fn enqueue_flattened(
    queue: &mut VecDeque<(ComponentRef, Vec<String>)>,
    resolved: &ResolvedComponent,
) {
    for dep in &resolved.version.flattened_dependencies {
        let mut carriers: Vec<String> = vec![resolved.target.id.scope.clone()];
        for sibling in &resolved.version.flattened_dependencies {
            if sibling != dep && !carriers.contains(&sibling.id.scope) {
                carriers.push(sibling.id.scope.clone());
            }
        }
        queue.push_back((dep.clone(), carriers));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use keel_store::{FileEntry, VersionLog};
    use std::collections::HashMap as Map;

    use async_trait::async_trait;

    /// A canned source backed by plain maps.
    struct MapSource {
        name: String,
        manifests: Map<ComponentId, ComponentManifest>,
        objects: Map<ObjectId, StoredObject>,
    }

    #[async_trait]
    impl ObjectSource for MapSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn manifest(&self, id: &ComponentId) -> GraphResult<Option<ComponentManifest>> {
            Ok(self.manifests.get(id).cloned())
        }

        async fn object(&self, id: &ObjectId) -> GraphResult<Option<StoredObject>> {
            Ok(self.objects.get(id).cloned())
        }
    }

    fn log() -> VersionLog {
        VersionLog {
            message: "test".into(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    struct SourceBuilder {
        name: String,
        manifests: Map<ComponentId, ComponentManifest>,
        objects: Map<ObjectId, StoredObject>,
    }

    impl SourceBuilder {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                manifests: Map::new(),
                objects: Map::new(),
            }
        }

        /// Record a component version with the given deps and flattened set.
        fn add(
            &mut self,
            id: &ComponentId,
            label: &str,
            deps: Vec<ComponentRef>,
            flattened: Vec<ComponentRef>,
        ) -> ObjectId {
            let label: VersionLabel = label.parse().unwrap();
            let blob = keel_store::Blob::new(format!("{id}@{label}").into_bytes());
            let blob_obj = blob.to_stored_object();
            let blob_id = blob_obj.compute_id();
            self.objects.insert(blob_id, blob_obj);

            let version = VersionObject::new(
                deps,
                flattened,
                vec![],
                vec![FileEntry::new("index.js", blob_id)],
                log(),
            );
            let obj = version.to_stored_object().unwrap();
            let vid = obj.compute_id();
            self.objects.insert(vid, obj);

            let manifest = self
                .manifests
                .entry(id.clone())
                .or_insert_with(|| ComponentManifest::new(id.clone()));
            manifest.assign_version(label, vid);
            manifest.head = Some(vid);
            vid
        }

        fn build(self) -> Arc<dyn ObjectSource> {
            Arc::new(MapSource {
                name: self.name,
                manifests: self.manifests,
                objects: self.objects,
            })
        }
    }

    fn empty_local() -> Arc<dyn ObjectSource> {
        SourceBuilder::new("local").build()
    }

    fn comp(scope: &str, name: &str) -> ComponentId {
        ComponentId::new(scope, name)
    }

    fn r(scope: &str, name: &str, label: &str) -> ComponentRef {
        comp(scope, name).at(label.parse().unwrap())
    }

    /// The three-component chain from the recovery scenarios:
    /// scope-a/comp1 -> scope-a/comp2 -> scope-b/comp3.
    fn build_chain(comp3_at_origin: bool, comp3_cached_at_a: bool) -> Resolver {
        let mut scope_a = SourceBuilder::new("scope-a");
        let mut scope_b = SourceBuilder::new("scope-b");

        if comp3_at_origin {
            scope_b.add(&comp("scope-b", "comp3"), "0.0.1", vec![], vec![]);
        }
        if comp3_cached_at_a {
            scope_a.add(&comp("scope-b", "comp3"), "0.0.1", vec![], vec![]);
        }
        scope_a.add(
            &comp("scope-a", "comp2"),
            "0.0.1",
            vec![r("scope-b", "comp3", "0.0.1")],
            vec![r("scope-b", "comp3", "0.0.1")],
        );
        scope_a.add(
            &comp("scope-a", "comp1"),
            "0.0.1",
            vec![r("scope-a", "comp2", "0.0.1")],
            vec![r("scope-a", "comp2", "0.0.1"), r("scope-b", "comp3", "0.0.1")],
        );

        let mut remotes: Map<String, Arc<dyn ObjectSource>> = Map::new();
        remotes.insert("scope-a".into(), scope_a.build());
        remotes.insert("scope-b".into(), scope_b.build());
        Resolver::new(empty_local(), remotes)
    }

    #[tokio::test]
    async fn resolves_full_closure_from_origins() {
        let resolver = build_chain(true, false);
        let resolution = resolver
            .resolve_import(&[ImportTarget::new(comp("scope-a", "comp1"))])
            .await
            .unwrap();
        assert!(resolution.missing.is_empty());
        let targets: Vec<String> = resolution
            .components
            .iter()
            .map(|c| c.target.to_string())
            .collect();
        assert!(targets.contains(&"scope-a/comp1@0.0.1".to_string()));
        assert!(targets.contains(&"scope-a/comp2@0.0.1".to_string()));
        assert!(targets.contains(&"scope-b/comp3@0.0.1".to_string()));
        // No cache carries comp3, so it resolves from its origin.
        let comp3 = resolution
            .components
            .iter()
            .find(|c| c.target.id.name == "comp3")
            .unwrap();
        assert!(comp3.provenance.is_origin());
    }

    #[tokio::test]
    async fn falls_back_to_dependent_cache_when_origin_lost() {
        let resolver = build_chain(false, true);
        let resolution = resolver
            .resolve_import(&[ImportTarget::new(comp("scope-a", "comp1"))])
            .await
            .unwrap();
        assert!(resolution.missing.is_empty());
        let comp3 = resolution
            .components
            .iter()
            .find(|c| c.target.id.name == "comp3")
            .unwrap();
        assert_eq!(
            comp3.provenance,
            Provenance::Cache {
                scope: "scope-a".into()
            }
        );
    }

    #[tokio::test]
    async fn reports_missing_when_all_sources_lost() {
        let resolver = build_chain(false, false);
        let resolution = resolver
            .resolve_import(&[ImportTarget::new(comp("scope-a", "comp1"))])
            .await
            .unwrap();
        assert_eq!(resolution.missing, vec![r("scope-b", "comp3", "0.0.1")]);
        // comp1 and comp2 still resolved; partial results are kept.
        assert_eq!(resolution.components.len(), 2);
    }

    #[tokio::test]
    async fn tag_resolution_fails_loudly_on_missing() {
        let resolver = build_chain(false, false);
        let err = resolver
            .resolve_dependencies(&[r("scope-a", "comp2", "0.0.1")])
            .await
            .unwrap_err();
        match err {
            GraphError::MissingDependencies(refs) => {
                assert_eq!(refs.0, vec![r("scope-b", "comp3", "0.0.1")]);
            }
            other => panic!("expected MissingDependencies, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tag_resolution_recovers_through_sibling_scope() {
        let resolver = build_chain(false, true);
        let resolution = resolver
            .resolve_dependencies(&[r("scope-a", "comp2", "0.0.1")])
            .await
            .unwrap();
        let comp3 = resolution
            .components
            .iter()
            .find(|c| c.target.id.name == "comp3")
            .unwrap();
        assert!(matches!(comp3.provenance, Provenance::Cache { .. }));
    }

    #[tokio::test]
    async fn explicit_target_absent_everywhere_is_component_not_found() {
        let resolver = build_chain(false, false);
        let err = resolver
            .resolve_import(&[ImportTarget::new(comp("scope-b", "comp3"))])
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::ComponentNotFound(_)));
    }

    #[tokio::test]
    async fn explicit_target_recovered_from_cache_scope() {
        let resolver = build_chain(false, true);
        let resolution = resolver
            .resolve_import(&[ImportTarget::pinned(
                comp("scope-b", "comp3"),
                "0.0.1".parse().unwrap(),
            )])
            .await
            .unwrap();
        let comp3 = &resolution.components[0];
        assert_eq!(
            comp3.provenance,
            Provenance::Cache {
                scope: "scope-a".into()
            }
        );
    }

    #[tokio::test]
    async fn shared_dependency_resolved_once() {
        let resolver = build_chain(true, true);
        let resolution = resolver
            .resolve_import(&[
                ImportTarget::new(comp("scope-a", "comp1")),
                ImportTarget::new(comp("scope-a", "comp2")),
            ])
            .await
            .unwrap();
        let comp3_hits = resolution
            .components
            .iter()
            .filter(|c| c.target.id.name == "comp3")
            .count();
        assert_eq!(comp3_hits, 1);
    }
}
