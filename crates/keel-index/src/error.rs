use keel_types::{ComponentId, VersionLabel};
use thiserror::Error;

/// Errors from manifest and index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The label is already recorded for this component.
    #[error("version {label} already exists for {component}")]
    VersionExists {
        component: ComponentId,
        label: VersionLabel,
    },

    /// Store error during an index rebuild.
    #[error("store error: {0}")]
    Store(#[from] keel_store::StoreError),
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
