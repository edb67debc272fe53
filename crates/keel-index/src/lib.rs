//! Scope-level bookkeeping for Keel.
//!
//! Three structures live here, all of them *about* the object store but
//! never a source of truth for object content:
//!
//! - [`ComponentManifest`] — per component: the `versions` map from label
//!   to version object id, the canonical `head`, and `orphaned_versions`
//!   for labels excluded from the canonical history graph. A label lives
//!   in exactly one of the two maps.
//! - [`ScopeIndex`] — mapping from [`ObjectId`] to a physical location.
//!   Purely a lookup structure, rebuildable by scanning the store.
//! - [`RemoteRefs`] — per (remote scope, component): the head last
//!   observed for that remote. Only sync operations update these.

pub mod error;
pub mod manifest;
pub mod remote_refs;
pub mod scope_index;

pub use error::{IndexError, IndexResult};
pub use manifest::{ComponentManifest, SyncState};
pub use remote_refs::{RemoteRef, RemoteRefs};
pub use scope_index::{IndexEntry, ScopeIndex};
