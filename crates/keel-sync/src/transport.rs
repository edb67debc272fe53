use async_trait::async_trait;

use keel_index::ComponentManifest;
use keel_store::StoredObject;
use keel_types::{ComponentId, ObjectId};

use crate::error::SyncResult;
use crate::types::{ExportPayload, PushReport};

/// Transport interface to a remote Keel scope.
///
/// Every remote operation — import fetches, export pushes, cache probes —
/// goes through this seam, so a scope can be reached in-process for tests
/// or over a network in a real deployment with the same engine code.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// The remote scope's name.
    fn scope_name(&self) -> &str;

    /// Of the given candidate ids, the subset the remote already holds.
    async fn has_objects(&self, ids: &[ObjectId]) -> SyncResult<Vec<ObjectId>>;

    /// The remote's manifest for a component, if it knows the component
    /// (its own or a cached foreign one).
    async fn fetch_component(&self, id: &ComponentId) -> SyncResult<Option<ComponentManifest>>;

    /// Fetch objects by id. Ids the remote does not hold are silently
    /// absent from the result.
    async fn fetch_objects(&self, ids: &[ObjectId]) -> SyncResult<Vec<StoredObject>>;

    /// Deliver an export payload. The remote applies it atomically per
    /// component: a rejected component leaves no trace.
    async fn push(&self, payload: ExportPayload) -> SyncResult<PushReport>;
}
