use thiserror::Error;

use keel_types::{ComponentId, ObjectId};

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("unknown remote: {0}")]
    UnknownRemote(String),

    /// A locally addressed component (e.g. an export target) that this
    /// scope has no manifest for.
    #[error("unknown component: {0}")]
    UnknownComponent(ComponentId),

    #[error("resolution error: {0}")]
    Graph(#[from] keel_graph::GraphError),

    #[error("merge error: {0}")]
    Merge(#[from] keel_merge::MergeError),

    #[error("index error: {0}")]
    Index(#[from] keel_index::IndexError),

    #[error("store error: {0}")]
    Store(#[from] keel_store::StoreError),

    #[error("sync error: {0}")]
    Sync(#[from] keel_sync::SyncError),
}

pub type ScopeResult<T> = Result<T, ScopeError>;
