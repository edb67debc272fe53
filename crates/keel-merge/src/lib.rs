//! Version-history merge and reconciliation for Keel.
//!
//! A component's version label may exist in one scope as a cached copy of a
//! history the authoritative scope has since abandoned or reissued. This
//! crate decides, deterministically and order-independently, what an
//! incoming manifest does to a locally known one: no-op, standard merge, or
//! divergence reconciliation via `orphaned_versions`.
//!
//! Divergence is a tagged [`MergeOutcome`], never an error: callers must
//! handle both the linear and the diverged case explicitly. Only `Push`
//! intent (a scope receiving an export) turns non-fast-forward history into
//! a hard [`MergeError::Conflict`], because exports fail atomically.

pub mod engine;
pub mod error;
pub mod history;

pub use engine::{merge_manifests, MergeIntent, MergeOutcome};
pub use error::{MergeError, MergeResult};
pub use history::{ancestors, is_ancestor, related};
