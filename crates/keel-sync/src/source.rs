use std::sync::Arc;

use async_trait::async_trait;

use keel_graph::{GraphError, GraphResult, ObjectSource};
use keel_index::ComponentManifest;
use keel_store::StoredObject;
use keel_types::{ComponentId, ObjectId};

use crate::error::SyncError;
use crate::transport::RemoteTransport;

/// Adapter exposing a [`RemoteTransport`] as a resolver [`ObjectSource`],
/// so remotes slot into the layered probe chain unchanged.
pub struct RemoteSource {
    transport: Arc<dyn RemoteTransport>,
}

impl RemoteSource {
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self { transport }
    }

    fn lift(&self, err: SyncError) -> GraphError {
        GraphError::Source {
            name: self.transport.scope_name().to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl ObjectSource for RemoteSource {
    fn name(&self) -> &str {
        self.transport.scope_name()
    }

    async fn manifest(&self, id: &ComponentId) -> GraphResult<Option<ComponentManifest>> {
        self.transport
            .fetch_component(id)
            .await
            .map_err(|e| self.lift(e))
    }

    async fn object(&self, id: &ObjectId) -> GraphResult<Option<StoredObject>> {
        let mut objects = self
            .transport
            .fetch_objects(std::slice::from_ref(id))
            .await
            .map_err(|e| self.lift(e))?;
        Ok(objects.pop())
    }
}
