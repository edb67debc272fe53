//! The Keel scope engine.
//!
//! A [`Scope`] owns an object store, per-component manifests, a rebuildable
//! object index, remote-ref observations, and a registry of remote
//! transports. On top of that state it offers the three commands everything
//! else is built from:
//!
//! - [`Scope::tag`] — snapshot a component version with its dependency
//!   closure resolved up front,
//! - [`Scope::import`] — materialize components and their closures from
//!   remote scopes, with cache fallback and divergence reconciliation,
//! - [`Scope::export`] — push canonical history (plus dependency cache
//!   material) to a remote scope, fast-forward only.
//!
//! [`InMemoryRemote`] wires one scope up as another scope's remote, so
//! whole multi-scope topologies run in-process.

pub mod error;
pub mod remote;
pub mod scope;
pub mod tag;

pub use error::{ScopeError, ScopeResult};
pub use remote::InMemoryRemote;
pub use scope::{ExportReport, ImportReport, Scope};
pub use tag::{SourceFile, TagOptions};

pub use keel_graph::ImportTarget;
