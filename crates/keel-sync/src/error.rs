use thiserror::Error;

use keel_types::{ComponentId, ObjectId};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote {remote}: {reason}")]
    Remote { remote: String, reason: String },

    /// The remote refused a push. The local scope is left untouched and
    /// the remote applied nothing.
    #[error("push rejected for {component}: {reason}")]
    PushRejected {
        component: ComponentId,
        reason: String,
    },

    #[error("payload object {id} failed verification: {reason}")]
    CorruptPayload { id: ObjectId, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("payload encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] keel_store::StoreError),
}

pub type SyncResult<T> = Result<T, SyncError>;
