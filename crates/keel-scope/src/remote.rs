//! In-process transport: one scope serving as another scope's remote.

use std::sync::Arc;

use async_trait::async_trait;

use keel_index::ComponentManifest;
use keel_merge::MergeError;
use keel_store::StoredObject;
use keel_sync::{ExportPayload, PushReport, RemoteTransport, SyncError, SyncResult};
use keel_types::{ComponentId, ObjectId};

use crate::error::ScopeError;
use crate::scope::Scope;

/// A [`RemoteTransport`] backed directly by another [`Scope`] instance.
///
/// This is how multi-scope topologies run in-process: tests and embedded
/// deployments wire scopes together with it, and the engine code cannot
/// tell it apart from a networked transport.
pub struct InMemoryRemote {
    scope: Arc<Scope>,
}

impl InMemoryRemote {
    pub fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }

    fn lift(&self, err: ScopeError) -> SyncError {
        SyncError::Remote {
            remote: self.scope.name().to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl RemoteTransport for InMemoryRemote {
    fn scope_name(&self) -> &str {
        self.scope.name()
    }

    async fn has_objects(&self, ids: &[ObjectId]) -> SyncResult<Vec<ObjectId>> {
        let mut held = Vec::new();
        for id in ids {
            if self.scope.has_object(id).map_err(|e| self.lift(e))? {
                held.push(*id);
            }
        }
        Ok(held)
    }

    async fn fetch_component(&self, id: &ComponentId) -> SyncResult<Option<ComponentManifest>> {
        Ok(self.scope.component(id))
    }

    async fn fetch_objects(&self, ids: &[ObjectId]) -> SyncResult<Vec<StoredObject>> {
        let mut objects = Vec::new();
        for id in ids {
            if let Some(object) = self.scope.get_object(id).map_err(|e| self.lift(e))? {
                objects.push(object);
            }
        }
        Ok(objects)
    }

    async fn push(&self, payload: ExportPayload) -> SyncResult<PushReport> {
        self.scope.receive_push(payload).map_err(|e| match e {
            ScopeError::Merge(MergeError::Conflict {
                component, reason, ..
            }) => SyncError::PushRejected { component, reason },
            ScopeError::Sync(inner) => inner,
            other => SyncError::Remote {
                remote: self.scope.name().to_string(),
                reason: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_graph::{GraphError, ImportTarget};
    use keel_index::SyncState;
    use keel_types::{ComponentRef, VersionLabel};

    use crate::tag::{SourceFile, TagOptions};

    fn scope(name: &str) -> Arc<Scope> {
        // Surface engine tracing in failing test output.
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Arc::new(Scope::new(name))
    }

    fn connect(client: &Scope, server: &Arc<Scope>) {
        client.add_remote(Arc::new(InMemoryRemote::new(server.clone())));
    }

    fn file(name: &str, contents: &str) -> SourceFile {
        SourceFile::new(name, contents.as_bytes().to_vec())
    }

    fn comp(scope: &str, name: &str) -> ComponentId {
        ComponentId::new(scope, name)
    }

    fn cref(scope: &str, name: &str, label: &str) -> ComponentRef {
        comp(scope, name).at(label.parse().unwrap())
    }

    /// The dependency chain the recovery scenarios revolve around:
    /// scope-a/comp1 -> scope-a/comp2 -> scope-b/comp3, published to two
    /// server scopes, comp3 carried into scope-a as cache by the export.
    async fn publish_chain() -> (Arc<Scope>, Arc<Scope>) {
        let server_a = scope("scope-a");
        let server_b = scope("scope-b");

        let author_b = scope("scope-b");
        connect(&author_b, &server_b);
        author_b
            .tag("comp3", vec![file("index.js", "comp3 v1")], vec![], TagOptions::default())
            .await
            .unwrap();
        author_b
            .export(&[comp("scope-b", "comp3")], "scope-b")
            .await
            .unwrap();

        let author_a = scope("scope-a");
        connect(&author_a, &server_a);
        connect(&author_a, &server_b);
        author_a
            .tag(
                "comp2",
                vec![file("index.js", "comp2 v1")],
                vec![cref("scope-b", "comp3", "0.0.1")],
                TagOptions::default(),
            )
            .await
            .unwrap();
        author_a
            .tag(
                "comp1",
                vec![file("index.js", "comp1 v1")],
                vec![cref("scope-a", "comp2", "0.0.1")],
                TagOptions::default(),
            )
            .await
            .unwrap();
        author_a
            .export(
                &[comp("scope-a", "comp1"), comp("scope-a", "comp2")],
                "scope-a",
            )
            .await
            .unwrap();

        (server_a, server_b)
    }

    fn consumer(server_a: &Arc<Scope>, server_b: &Arc<Scope>) -> Arc<Scope> {
        let ws = scope("ws");
        connect(&ws, server_a);
        connect(&ws, server_b);
        ws
    }

    // -----------------------------------------------------------------------
    // Publication and export
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn export_carries_dependency_cache() {
        let (server_a, _server_b) = publish_chain().await;
        // scope-a now serves comp3 even though scope-b owns it.
        let cached = server_a.component(&comp("scope-b", "comp3")).unwrap();
        assert!(cached.version(&VersionLabel::first()).is_some());
        assert_eq!(cached.sync_state(), SyncState::Synced);
        // And the backing objects came along.
        let head = cached.head.unwrap();
        assert!(server_a.has_object(&head).unwrap());
    }

    #[tokio::test]
    async fn export_records_remote_ref() {
        let server_b = scope("scope-b");
        let author = scope("scope-b");
        connect(&author, &server_b);
        author
            .tag("comp3", vec![file("index.js", "v1")], vec![], TagOptions::default())
            .await
            .unwrap();
        author.export(&[comp("scope-b", "comp3")], "scope-b").await.unwrap();

        let head = author.component(&comp("scope-b", "comp3")).unwrap().head.unwrap();
        assert_eq!(
            author.remote_refs().get("scope-b", &comp("scope-b", "comp3")),
            Some(head)
        );
    }

    #[tokio::test]
    async fn repeated_export_sends_nothing() {
        let server_b = scope("scope-b");
        let author = scope("scope-b");
        connect(&author, &server_b);
        author
            .tag("comp3", vec![file("index.js", "v1")], vec![], TagOptions::default())
            .await
            .unwrap();
        let first = author.export(&[comp("scope-b", "comp3")], "scope-b").await.unwrap();
        assert!(first.objects_sent > 0);
        let second = author.export(&[comp("scope-b", "comp3")], "scope-b").await.unwrap();
        assert_eq!(second.objects_sent, 0);
    }

    #[tokio::test]
    async fn non_fast_forward_push_is_rejected_atomically() {
        let (server_a, _server_b) = publish_chain().await;
        let before = server_a.component(&comp("scope-a", "comp1")).unwrap();

        // An unrelated history claiming the same component and label.
        let rogue = scope("scope-a");
        connect(&rogue, &server_a);
        rogue
            .tag("comp1", vec![file("index.js", "rewritten")], vec![], TagOptions::default())
            .await
            .unwrap();
        let err = rogue
            .export(&[comp("scope-a", "comp1")], "scope-a")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScopeError::Sync(SyncError::PushRejected { .. })
        ));
        // The remote kept its history untouched.
        assert_eq!(server_a.component(&comp("scope-a", "comp1")).unwrap(), before);
    }

    // -----------------------------------------------------------------------
    // Import and cache fallback
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn import_materializes_full_closure() {
        let (server_a, server_b) = publish_chain().await;
        let ws = consumer(&server_a, &server_b);

        let report = ws
            .import(&[ImportTarget::new(comp("scope-a", "comp1"))])
            .await
            .unwrap();
        assert!(report.missing.is_empty());
        assert_eq!(
            report.resolved,
            vec![
                cref("scope-a", "comp1", "0.0.1"),
                cref("scope-a", "comp2", "0.0.1"),
                cref("scope-b", "comp3", "0.0.1"),
            ]
        );
        // Origin-observed heads are recorded per remote.
        let comp1_head = ws.component(&comp("scope-a", "comp1")).unwrap().head.unwrap();
        assert_eq!(
            ws.remote_refs().get("scope-a", &comp("scope-a", "comp1")),
            Some(comp1_head)
        );
    }

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let (server_a, server_b) = publish_chain().await;
        let ws = consumer(&server_a, &server_b);

        let target = [ImportTarget::new(comp("scope-a", "comp1"))];
        ws.import(&target).await.unwrap();
        let snapshot = ws.components();
        let objects = ws.list_objects().unwrap();

        let report = ws.import(&target).await.unwrap();
        assert!(report.missing.is_empty());
        assert_eq!(ws.components(), snapshot);
        assert_eq!(ws.list_objects().unwrap(), objects);
    }

    #[tokio::test]
    async fn import_recovers_deleted_dependency_from_dependent_scope() {
        let (server_a, server_b) = publish_chain().await;
        // comp3 vanishes from its authoritative scope.
        assert!(server_b.remove_component(&comp("scope-b", "comp3")).unwrap());

        let ws = consumer(&server_a, &server_b);
        let report = ws
            .import(&[ImportTarget::new(comp("scope-a", "comp1"))])
            .await
            .unwrap();
        assert!(report.missing.is_empty());

        let recovered = ws.component(&comp("scope-b", "comp3")).unwrap();
        let head = recovered.head.unwrap();
        assert_eq!(recovered.version(&VersionLabel::first()), Some(head));
        assert!(ws.has_object(&head).unwrap());
    }

    #[tokio::test]
    async fn tag_recovers_deleted_dependency_from_dependent_scope() {
        let (server_a, server_b) = publish_chain().await;
        assert!(server_b.remove_component(&comp("scope-b", "comp3")).unwrap());

        // A third scope depends on comp3 directly; only scope-a still has it.
        let dev = scope("scope-c");
        connect(&dev, &server_a);
        connect(&dev, &server_b);
        let tagged = dev
            .tag(
                "comp4",
                vec![file("index.js", "comp4 v1")],
                vec![cref("scope-b", "comp3", "0.0.1")],
                TagOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(tagged.version, VersionLabel::first());
        // The recovered snapshot is now cached locally.
        assert!(dev.component(&comp("scope-b", "comp3")).is_some());
    }

    #[tokio::test]
    async fn total_loss_degrades_import_and_fails_tag() {
        let (server_a, server_b) = publish_chain().await;
        assert!(server_b.remove_component(&comp("scope-b", "comp3")).unwrap());
        assert!(server_a.remove_component(&comp("scope-b", "comp3")).unwrap());

        let ws = consumer(&server_a, &server_b);
        let report = ws
            .import(&[ImportTarget::new(comp("scope-a", "comp1"))])
            .await
            .unwrap();
        assert_eq!(report.missing, vec![cref("scope-b", "comp3", "0.0.1")]);
        // comp1 and comp2 still landed.
        assert!(ws.component(&comp("scope-a", "comp1")).is_some());
        assert!(ws.component(&comp("scope-a", "comp2")).is_some());

        let err = ws
            .tag(
                "comp4",
                vec![file("index.js", "v1")],
                vec![cref("scope-b", "comp3", "0.0.1")],
                TagOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScopeError::Graph(GraphError::MissingDependencies(_))
        ));

        let err = ws
            .import(&[ImportTarget::new(comp("scope-b", "comp3"))])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScopeError::Graph(GraphError::ComponentNotFound(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Divergence reconciliation
    // -----------------------------------------------------------------------

    /// Rebuild comp3 at its authoritative scope with an unrelated history
    /// whose only label is 0.0.2.
    async fn recreate_comp3(server_b: &Arc<Scope>) {
        assert!(server_b.remove_component(&comp("scope-b", "comp3")).unwrap());
        let author = scope("scope-b");
        connect(&author, server_b);
        author
            .tag(
                "comp3",
                vec![file("index.js", "comp3 rebuilt")],
                vec![],
                TagOptions::message("rebuilt").with_label("0.0.2".parse().unwrap()),
            )
            .await
            .unwrap();
        author.export(&[comp("scope-b", "comp3")], "scope-b").await.unwrap();
    }

    fn assert_reconciled(ws: &Scope, server_b: &Scope) {
        let manifest = ws.component(&comp("scope-b", "comp3")).unwrap();
        assert_eq!(manifest.sync_state(), SyncState::Diverged);

        // 0.0.2 is canonical and is the head; 0.0.1 survives as an orphan.
        let canonical: Vec<VersionLabel> = manifest.versions.keys().copied().collect();
        assert_eq!(canonical, vec!["0.0.2".parse().unwrap()]);
        let orphaned: Vec<VersionLabel> = manifest.orphaned_versions.keys().copied().collect();
        assert_eq!(orphaned, vec![VersionLabel::first()]);

        let origin_head = server_b.component(&comp("scope-b", "comp3")).unwrap().head.unwrap();
        assert_eq!(manifest.head, Some(origin_head));
        assert_eq!(
            ws.remote_refs().get("scope-b", &comp("scope-b", "comp3")),
            Some(origin_head)
        );

        // Both snapshots stay materializable.
        let old = manifest.lookup(&VersionLabel::first()).unwrap();
        assert!(old.1);
        assert!(ws.has_object(&old.0).unwrap());
        assert!(ws.has_object(&origin_head).unwrap());
    }

    #[tokio::test]
    async fn divergence_reconciled_importing_dependent_first() {
        let (server_a, server_b) = publish_chain().await;
        recreate_comp3(&server_b).await;

        let ws = consumer(&server_a, &server_b);
        ws.import(&[ImportTarget::new(comp("scope-a", "comp1"))]).await.unwrap();
        ws.import(&[ImportTarget::new(comp("scope-b", "comp3"))]).await.unwrap();
        assert_reconciled(&ws, &server_b);
    }

    #[tokio::test]
    async fn divergence_reconciled_importing_origin_first() {
        let (server_a, server_b) = publish_chain().await;
        recreate_comp3(&server_b).await;

        let ws = consumer(&server_a, &server_b);
        ws.import(&[ImportTarget::new(comp("scope-b", "comp3"))]).await.unwrap();
        ws.import(&[ImportTarget::new(comp("scope-a", "comp1"))]).await.unwrap();
        assert_reconciled(&ws, &server_b);
    }

    #[tokio::test]
    async fn divergence_reconciled_importing_as_one_batch() {
        let (server_a, server_b) = publish_chain().await;
        recreate_comp3(&server_b).await;

        let ws = consumer(&server_a, &server_b);
        ws.import(&[
            ImportTarget::new(comp("scope-a", "comp1")),
            ImportTarget::new(comp("scope-b", "comp3")),
        ])
        .await
        .unwrap();
        assert_reconciled(&ws, &server_b);
    }

    #[tokio::test]
    async fn orphans_never_leave_on_export() {
        let (server_a, server_b) = publish_chain().await;
        recreate_comp3(&server_b).await;

        let ws = consumer(&server_a, &server_b);
        ws.import(&[
            ImportTarget::new(comp("scope-a", "comp1")),
            ImportTarget::new(comp("scope-b", "comp3")),
        ])
        .await
        .unwrap();
        assert_reconciled(&ws, &server_b);

        // Re-exporting the diverged component carries only canonical state.
        ws.export(&[comp("scope-b", "comp3")], "scope-b").await.unwrap();
        let at_origin = server_b.component(&comp("scope-b", "comp3")).unwrap();
        assert!(at_origin.orphaned_versions.is_empty());
        assert_eq!(at_origin.sync_state(), SyncState::Synced);
    }
}
