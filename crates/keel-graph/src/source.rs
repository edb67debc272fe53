use async_trait::async_trait;

use keel_index::ComponentManifest;
use keel_store::StoredObject;
use keel_types::{ComponentId, ObjectId};

use crate::error::GraphResult;

/// A uniform probe over one place objects may live: the local scope, a
/// dependent's scope acting as a cache, or a component's authoritative
/// scope. Sources are tried in sequence; absence is a `None`, never an
/// error, so exhaustion of the chain is what surfaces failures.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// A stable name for logs and error messages ("local" or a scope name).
    fn name(&self) -> &str;

    /// The source's manifest for a component, if it knows the component.
    async fn manifest(&self, id: &ComponentId) -> GraphResult<Option<ComponentManifest>>;

    /// An object by id, if the source holds it.
    async fn object(&self, id: &ObjectId) -> GraphResult<Option<StoredObject>>;
}
