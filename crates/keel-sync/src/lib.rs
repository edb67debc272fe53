//! Scope-to-scope transfer for Keel.
//!
//! Defines the [`RemoteTransport`] seam every remote scope is reached
//! through, the wire payload types that cross it, a negotiation helper that
//! avoids re-sending objects the remote already holds, and an adapter
//! exposing any transport as a resolver [`ObjectSource`].
//!
//! Transfer is object-granular and idempotent: payloads carry
//! content-addressed objects plus the canonical manifest projection, and
//! re-delivering a payload is always safe.

pub mod error;
pub mod negotiation;
pub mod source;
pub mod transport;
pub mod types;
pub mod verifier;

pub use error::{SyncError, SyncResult};
pub use negotiation::NegotiationEngine;
pub use source::RemoteSource;
pub use transport::RemoteTransport;
pub use types::{ComponentPayload, ExportPayload, Negotiation, PushReport};
pub use verifier::PayloadVerifier;
