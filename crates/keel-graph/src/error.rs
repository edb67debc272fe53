use std::fmt;

use keel_types::ComponentRef;
use thiserror::Error;

use crate::resolver::ImportTarget;

/// A displayable list of component references, for error payloads that must
/// enumerate every failing ref rather than just the first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefList(pub Vec<ComponentRef>);

impl RefList {
    pub fn new(mut refs: Vec<ComponentRef>) -> Self {
        refs.sort();
        refs.dedup();
        Self(refs)
    }
}

impl fmt::Display for RefList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for r in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{r}")?;
            first = false;
        }
        Ok(())
    }
}

/// A displayable list of requested import targets, where a target may be
/// pinned to a version or left open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetList(pub Vec<ImportTarget>);

impl TargetList {
    pub fn new(mut targets: Vec<ImportTarget>) -> Self {
        targets.dedup();
        Self(targets)
    }
}

impl fmt::Display for TargetList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for t in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{t}")?;
            first = false;
        }
        Ok(())
    }
}

/// Errors from dependency resolution.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An explicitly requested component (or version) is absent from its
    /// own authoritative scope with no cache fallback anywhere.
    #[error("component/version not found: {0}")]
    ComponentNotFound(TargetList),

    /// One or more dependencies could not be resolved from any source.
    /// Carries the complete list of unresolved refs.
    #[error("has the following dependencies missing: {0}")]
    MissingDependencies(RefList),

    /// A source failed while being probed.
    #[error("source {name}: {reason}")]
    Source { name: String, reason: String },

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] keel_store::StoreError),
}

/// Result alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
