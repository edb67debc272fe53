use keel_types::{ComponentId, VersionLabel};
use thiserror::Error;

/// Errors from merge operations.
///
/// Divergence is *not* an error — it is reported through
/// [`MergeOutcome::Diverged`](crate::MergeOutcome). `Conflict` only arises
/// under `Push` intent, where history that does not fast-forward must
/// reject the whole transfer.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Incoming history cannot be applied under `Push` intent.
    #[error("merge conflict for {component}: {reason}")]
    Conflict {
        component: ComponentId,
        label: Option<VersionLabel>,
        reason: String,
    },

    /// Store error while traversing version history.
    #[error("store error: {0}")]
    Store(#[from] keel_store::StoreError),
}

/// Result alias for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;
