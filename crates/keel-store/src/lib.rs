//! Content-addressed object storage for Keel scopes.
//!
//! This crate implements a hash-keyed, append-only object store. Every
//! immutable piece of data in a scope — payload blobs and version records —
//! is stored as an object identified by its BLAKE3 hash (domain-separated
//! by object kind).
//!
//! # Object Types
//!
//! - [`Blob`] — raw payload content (component file contents)
//! - [`VersionObject`] — an immutable component version record: direct
//!   dependencies, the flattened dependency closure computed at tag time,
//!   parent snapshot ids, and payload file references
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] — `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Writes of identical content are no-ops; re-writing is always safe.
//! 3. Concurrent reads are always safe (objects are immutable).
//! 4. No object encodes its own storage path; locations are an index concern.
//! 5. The store never interprets object contents — it is a pure key-value store.
//! 6. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::{Blob, FileEntry, ObjectKind, StoredObject, VersionLog, VersionObject};
pub use traits::ObjectStore;
