//! The scope engine: state plus the tag / import / export commands.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use keel_graph::{
    GraphResult, ImportTarget, ObjectSource, Provenance, Resolution, ResolvedComponent, Resolver,
};
use keel_index::{ComponentManifest, IndexError, RemoteRefs, ScopeIndex};
use keel_merge::{merge_manifests, MergeIntent, MergeOutcome};
use keel_store::{
    Blob, FileEntry, InMemoryObjectStore, ObjectKind, ObjectStore, StoredObject, VersionLog,
    VersionObject,
};
use keel_sync::{
    ComponentPayload, ExportPayload, NegotiationEngine, PayloadVerifier, PushReport, RemoteSource,
    RemoteTransport,
};
use keel_types::{ComponentId, ComponentRef, ObjectId, VersionLabel};

use crate::error::{ScopeError, ScopeResult};
use crate::tag::{SourceFile, TagOptions};

/// What an import materialized and what it could not.
#[derive(Clone, Debug)]
pub struct ImportReport {
    /// Every reference resolved and applied, sorted.
    pub resolved: Vec<ComponentRef>,
    /// Transitive references no source could satisfy.
    pub missing: Vec<ComponentRef>,
}

/// What an export delivered.
#[derive(Clone, Debug)]
pub struct ExportReport {
    pub remote: String,
    /// Components pushed into the remote's own history.
    pub pushed: Vec<ComponentId>,
    /// Dependency components the remote folded in as cache.
    pub carried_as_cache: Vec<ComponentId>,
    /// Objects actually transferred after negotiation.
    pub objects_sent: usize,
}

/// Shared mutable state: the object store and the per-component manifests.
/// Held behind an `Arc` so the local resolver source can read it while an
/// operation is in flight.
struct ScopeState {
    store: InMemoryObjectStore,
    manifests: RwLock<BTreeMap<ComponentId, ComponentManifest>>,
}

/// The resolver's view of this scope's own holdings.
struct LocalSource {
    state: Arc<ScopeState>,
}

#[async_trait]
impl ObjectSource for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn manifest(&self, id: &ComponentId) -> GraphResult<Option<ComponentManifest>> {
        Ok(self
            .state
            .manifests
            .read()
            .expect("lock poisoned")
            .get(id)
            .cloned())
    }

    async fn object(&self, id: &ObjectId) -> GraphResult<Option<StoredObject>> {
        Ok(self.state.store.read(id)?)
    }
}

/// One scope: a named authority over its own components, a cache for the
/// dependencies they pull in, and a client of other scopes.
pub struct Scope {
    name: String,
    state: Arc<ScopeState>,
    index: ScopeIndex,
    remote_refs: RemoteRefs,
    remotes: RwLock<HashMap<String, Arc<dyn RemoteTransport>>>,
}

impl Scope {
    /// Create an empty scope.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(ScopeState {
                store: InMemoryObjectStore::new(),
                manifests: RwLock::new(BTreeMap::new()),
            }),
            index: ScopeIndex::new(),
            remote_refs: RemoteRefs::new(),
            remotes: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a remote scope, keyed by the remote's own name.
    pub fn add_remote(&self, transport: Arc<dyn RemoteTransport>) {
        let name = transport.scope_name().to_string();
        self.remotes
            .write()
            .expect("lock poisoned")
            .insert(name, transport);
    }

    // ---- Object store operations ----

    pub fn put_object(&self, object: &StoredObject) -> ScopeResult<ObjectId> {
        let id = self.state.store.write(object)?;
        self.index.note(id, object.kind);
        Ok(id)
    }

    pub fn put_blob(&self, data: &[u8]) -> ScopeResult<ObjectId> {
        self.put_object(&Blob::new(data.to_vec()).to_stored_object())
    }

    pub fn get_object(&self, id: &ObjectId) -> ScopeResult<Option<StoredObject>> {
        Ok(self.state.store.read(id)?)
    }

    pub fn read_blob(&self, id: &ObjectId) -> ScopeResult<Vec<u8>> {
        let object = self
            .state
            .store
            .read(id)?
            .ok_or(ScopeError::ObjectNotFound(*id))?;
        Ok(Blob::from_stored_object(&object)?.data)
    }

    pub fn has_object(&self, id: &ObjectId) -> ScopeResult<bool> {
        Ok(self.state.store.exists(id)?)
    }

    pub fn list_objects(&self) -> ScopeResult<Vec<ObjectId>> {
        Ok(self.state.store.list()?)
    }

    /// Administrative removal. Normal flows never delete; recovery logic
    /// must tolerate objects removed this way.
    pub fn remove_object(&self, id: &ObjectId) -> ScopeResult<bool> {
        let existed = self.state.store.delete(id)?;
        if existed {
            self.index.forget(id);
        }
        Ok(existed)
    }

    /// Administrative removal of a whole component: manifest, version
    /// objects, and their payload blobs.
    pub fn remove_component(&self, id: &ComponentId) -> ScopeResult<bool> {
        let removed = self
            .state
            .manifests
            .write()
            .expect("lock poisoned")
            .remove(id);
        let Some(manifest) = removed else {
            return Ok(false);
        };
        for version_id in manifest.all_version_ids() {
            if let Some(object) = self.state.store.read(&version_id)? {
                if let Ok(version) = VersionObject::from_stored_object(&object) {
                    for file in &version.files {
                        self.remove_object(&file.blob)?;
                    }
                }
            }
            self.remove_object(&version_id)?;
        }
        warn!(component = %id, "component removed administratively");
        Ok(true)
    }

    // ---- Inspection ----

    pub fn component(&self, id: &ComponentId) -> Option<ComponentManifest> {
        self.state
            .manifests
            .read()
            .expect("lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn components(&self) -> Vec<ComponentManifest> {
        self.state
            .manifests
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn index(&self) -> &ScopeIndex {
        &self.index
    }

    pub fn remote_refs(&self) -> &RemoteRefs {
        &self.remote_refs
    }

    /// Re-derive the object index from the store.
    pub fn rebuild_index(&self) -> ScopeResult<usize> {
        Ok(self.index.rebuild(&self.state.store)?)
    }

    // ---- Commands ----

    /// Tag a new version of one of this scope's own components.
    ///
    /// Every direct dependency and its transitive closure must resolve
    /// before anything is recorded; a single unresolvable reference aborts
    /// the tag with the complete missing list. Recovered dependency
    /// material is written locally as part of the resolution.
    pub async fn tag(
        &self,
        component: &str,
        files: Vec<SourceFile>,
        dependencies: Vec<ComponentRef>,
        options: TagOptions,
    ) -> ScopeResult<ComponentRef> {
        let id = ComponentId::new(self.name.clone(), component);
        let resolution = if dependencies.is_empty() {
            Resolution::default()
        } else {
            self.resolver().resolve_dependencies(&dependencies).await?
        };
        for resolved in &resolution.components {
            self.apply_resolved(resolved)?;
        }

        // The flattened closure travels with the version, frozen at tag time.
        let mut flattened = dependencies.clone();
        for resolved in &resolution.components {
            flattened.push(resolved.target.clone());
            flattened.extend(resolved.version.flattened_dependencies.iter().cloned());
        }

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let blob = Blob::new(file.contents).to_stored_object();
            let blob_id = self.state.store.write(&blob)?;
            self.index.note(blob_id, ObjectKind::Blob);
            entries.push(FileEntry::new(file.name, blob_id));
        }

        let mut manifests = self.state.manifests.write().expect("lock poisoned");
        let manifest = manifests
            .entry(id.clone())
            .or_insert_with(|| ComponentManifest::new(id.clone()));
        let label = match options.label {
            Some(label) => {
                if manifest.lookup(&label).is_some() {
                    return Err(IndexError::VersionExists {
                        component: id,
                        label,
                    }
                    .into());
                }
                label
            }
            None => {
                let mut label = manifest
                    .latest_label()
                    .map(|l| l.bump_patch())
                    .unwrap_or_else(VersionLabel::first);
                // An orphan may squat on the bumped label.
                while manifest.lookup(&label).is_some() {
                    label = label.bump_patch();
                }
                label
            }
        };

        let parents: Vec<ObjectId> = manifest.head.into_iter().collect();
        let version = VersionObject::new(
            dependencies,
            flattened,
            parents,
            entries,
            VersionLog {
                message: options.message,
                timestamp: Utc::now(),
            },
        );
        let object = version.to_stored_object()?;
        let version_id = self.state.store.write(&object)?;
        self.index.note(version_id, ObjectKind::Version);
        manifest.record_version(label, version_id)?;
        manifest.head = Some(version_id);
        info!(component = %id, label = %label, id = %version_id.short_hex(), "tagged version");
        Ok(id.at(label))
    }

    /// Import components (and their closures) from remote scopes.
    ///
    /// Canonical, origin-fetched manifests are applied before cache-fetched
    /// ones, so the final state does not depend on resolution order.
    /// Transitively missing references are reported, not fatal.
    pub async fn import(&self, targets: &[ImportTarget]) -> ScopeResult<ImportReport> {
        let resolution = self.resolver().resolve_import(targets).await?;
        let mut ordered: Vec<&ResolvedComponent> = resolution.components.iter().collect();
        ordered.sort_by_key(|c| match &c.provenance {
            Provenance::Origin { .. } => 0,
            Provenance::Cache { .. } => 1,
            Provenance::Local => 2,
        });
        let mut resolved = Vec::with_capacity(ordered.len());
        for component in ordered {
            self.apply_resolved(component)?;
            resolved.push(component.target.clone());
        }
        resolved.sort();
        info!(
            resolved = resolved.len(),
            missing = resolution.missing.len(),
            "import complete"
        );
        Ok(ImportReport {
            resolved,
            missing: resolution.missing,
        })
    }

    /// Push components to a remote scope.
    ///
    /// The payload carries the canonical manifest projection of each target
    /// (orphans never leave the scope), the manifests of their flattened
    /// dependencies as cache material, and only the objects the remote
    /// reports missing. The remote applies the whole payload or none of it.
    pub async fn export(
        &self,
        components: &[ComponentId],
        remote: &str,
    ) -> ScopeResult<ExportReport> {
        let transport = self
            .remotes
            .read()
            .expect("lock poisoned")
            .get(remote)
            .cloned()
            .ok_or_else(|| ScopeError::UnknownRemote(remote.to_string()))?;

        let mut payload_components: Vec<ComponentPayload> = Vec::new();
        {
            let manifests = self.state.manifests.read().expect("lock poisoned");
            let mut dependency_ids: BTreeSet<ComponentId> = BTreeSet::new();
            for id in components {
                let manifest = manifests
                    .get(id)
                    .ok_or_else(|| ScopeError::UnknownComponent(id.clone()))?
                    .canonical();
                for version_id in manifest.versions.values() {
                    let Some(object) = self.state.store.read(version_id)? else {
                        continue;
                    };
                    if let Ok(version) = VersionObject::from_stored_object(&object) {
                        for dep in &version.flattened_dependencies {
                            if !components.contains(&dep.id) {
                                dependency_ids.insert(dep.id.clone());
                            }
                        }
                    }
                }
                let objects = self.collect_component_objects(&manifest)?;
                payload_components.push(ComponentPayload::new(manifest, objects)?);
            }
            for dep in dependency_ids {
                let Some(manifest) = manifests.get(&dep) else {
                    warn!(component = %dep, "dependency not held locally, not carried");
                    continue;
                };
                let manifest = manifest.canonical();
                let objects = self.collect_component_objects(&manifest)?;
                payload_components.push(ComponentPayload::new(manifest, objects)?);
            }
        }

        let candidates: Vec<ObjectId> = payload_components
            .iter()
            .flat_map(|c| c.object_ids())
            .collect();
        let negotiation = NegotiationEngine::negotiate(transport.as_ref(), &candidates).await?;
        let wanted: HashSet<ObjectId> = negotiation.wants.iter().copied().collect();
        for component in &mut payload_components {
            component.objects.retain(|o| wanted.contains(&o.compute_id()));
        }

        let payload = ExportPayload {
            components: payload_components,
        };
        let objects_sent = payload.object_count();
        let report = transport.push(payload).await?;

        {
            let manifests = self.state.manifests.read().expect("lock poisoned");
            for id in components {
                if let Some(head) = manifests.get(id).and_then(|m| m.head) {
                    self.remote_refs.set(remote, id, head);
                }
            }
        }
        info!(remote, pushed = components.len(), objects = objects_sent, "export complete");
        Ok(ExportReport {
            remote: remote.to_string(),
            pushed: components.to_vec(),
            carried_as_cache: report.cached,
            objects_sent,
        })
    }

    /// Apply an incoming export payload. Called on the receiving side.
    ///
    /// Objects land first (content-addressed, so safe even if the rest
    /// fails); manifest merges are staged for every component and committed
    /// only if all of them succeed. A rejected push therefore leaves only
    /// unreferenced objects behind.
    pub fn receive_push(&self, payload: ExportPayload) -> ScopeResult<PushReport> {
        PayloadVerifier::verify(&payload)?;

        let mut objects_received = 0usize;
        for component in &payload.components {
            for object in &component.objects {
                let id = object.compute_id();
                if !self.state.store.exists(&id)? {
                    objects_received += 1;
                }
                self.state.store.write(object)?;
                self.index.note(id, object.kind);
            }
        }

        let mut manifests = self.state.manifests.write().expect("lock poisoned");
        let mut staged: Vec<(ComponentId, ComponentManifest)> = Vec::new();
        let mut accepted = Vec::new();
        let mut cached = Vec::new();
        for component in &payload.components {
            let id = &component.manifest.id;
            let intent = if id.scope == self.name {
                MergeIntent::Push
            } else {
                MergeIntent::Cache
            };
            let (merged, outcome) = merge_manifests(
                &self.state.store,
                manifests.get(id),
                &component.manifest,
                intent,
            )?;
            debug!(component = %id, intent = ?intent, outcome = ?outcome, "staged incoming manifest");
            if intent == MergeIntent::Push {
                accepted.push(id.clone());
            } else {
                cached.push(id.clone());
            }
            staged.push((id.clone(), merged));
        }
        for (id, manifest) in staged {
            manifests.insert(id, manifest);
        }

        Ok(PushReport {
            accepted,
            cached,
            objects_received,
        })
    }

    // ---- Internals ----

    fn resolver(&self) -> Resolver {
        let local: Arc<dyn ObjectSource> = Arc::new(LocalSource {
            state: self.state.clone(),
        });
        let remotes = self.remotes.read().expect("lock poisoned");
        let sources: HashMap<String, Arc<dyn ObjectSource>> = remotes
            .iter()
            .map(|(name, transport)| {
                (
                    name.clone(),
                    Arc::new(RemoteSource::new(transport.clone())) as Arc<dyn ObjectSource>,
                )
            })
            .collect();
        Resolver::new(local, sources)
    }

    /// Write a resolved component's objects and fold its manifest in under
    /// the intent its provenance dictates.
    fn apply_resolved(&self, resolved: &ResolvedComponent) -> ScopeResult<MergeOutcome> {
        let intent = match &resolved.provenance {
            Provenance::Local => return Ok(MergeOutcome::Unchanged),
            Provenance::Origin { .. } => MergeIntent::Origin,
            Provenance::Cache { .. } => MergeIntent::Cache,
        };
        for object in &resolved.objects {
            let id = self.state.store.write(object)?;
            self.index.note(id, object.kind);
        }
        let outcome = {
            let mut manifests = self.state.manifests.write().expect("lock poisoned");
            let (merged, outcome) = merge_manifests(
                &self.state.store,
                manifests.get(&resolved.target.id),
                &resolved.manifest,
                intent,
            )?;
            manifests.insert(resolved.target.id.clone(), merged);
            outcome
        };
        if let Provenance::Origin { scope } = &resolved.provenance {
            if let Some(head) = resolved.manifest.head {
                self.remote_refs.set(scope, &resolved.target.id, head);
            }
        }
        debug!(component = %resolved.target, outcome = ?outcome, "applied resolved component");
        Ok(outcome)
    }

    fn collect_component_objects(
        &self,
        manifest: &ComponentManifest,
    ) -> ScopeResult<Vec<StoredObject>> {
        let mut objects = Vec::new();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        for version_id in manifest.versions.values() {
            let Some(object) = self.state.store.read(version_id)? else {
                continue;
            };
            if let Ok(version) = VersionObject::from_stored_object(&object) {
                for file in &version.files {
                    if seen.insert(file.blob) {
                        if let Some(blob) = self.state.store.read(&file.blob)? {
                            objects.push(blob);
                        }
                    }
                }
            }
            if seen.insert(*version_id) {
                objects.push(object);
            }
        }
        Ok(objects)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field(
                "components",
                &self.state.manifests.read().expect("lock poisoned").len(),
            )
            .finish()
    }
}
