//! Foundation types for Keel.
//!
//! This crate provides the core identity and addressing types used
//! throughout the Keel system. Every other Keel crate depends on
//! `keel-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] — Content-addressed identifier (BLAKE3 hash)
//! - [`ComponentId`] — A component's identity: its scope plus its name
//! - [`ComponentRef`] — A component pinned to a specific version label
//! - [`VersionLabel`] — A `major.minor.patch` version label with ordering
//! - [`ContentHasher`] — Domain-separated BLAKE3 hasher for object kinds

pub mod component;
pub mod error;
pub mod hasher;
pub mod object;

pub use component::{ComponentId, ComponentRef, VersionLabel};
pub use error::TypeError;
pub use hasher::ContentHasher;
pub use object::ObjectId;
