//! Dependency graph resolution for Keel.
//!
//! Given a requested component version, this crate produces the complete,
//! consistent set of objects needed to materialize it locally. Every
//! required reference is probed through an ordered list of polymorphic
//! [`ObjectSource`]s:
//!
//! 1. the local scope (store + manifests),
//! 2. the scopes of dependents that carried the reference ("cache of the
//!    dependent"),
//! 3. the reference's own authoritative scope.
//!
//! The first hit wins and nothing is re-fetched within one resolution. The
//! walk is iterative over an explicit work queue with a visited set keyed
//! by [`ComponentRef`], so shared transitive dependencies dedupe naturally
//! and recursion depth is never a concern.

pub mod error;
pub mod resolver;
pub mod source;

pub use error::{GraphError, GraphResult, RefList, TargetList};
pub use resolver::{
    ImportTarget, Provenance, ResolvedComponent, Resolution, Resolver,
};
pub use source::ObjectSource;
