//! Encryption Layering
//!
//! Every addressed, privacy-sensitive payload is wrapped exactly once per
//! recipient before it touches a relay.
//!
//! ## Layers
//!
//! ```text
//! Rumor     unsigned template stamped with the true author
//!   └─ Seal       kind 13, content = encrypt(rumor), signed by the author
//!        └─ Wrap  kind 1059 (or 1060), content = encrypt(seal),
//!                 signed by a single-use key, tagged ["p", recipient]
//! ```
//!
//! Relays and observers only see the wrap: an unrelated signer and a
//! recipient tag. The seal proves authorship to the recipient alone, and
//! the rumor, being unsigned, cannot be replayed as proof if it leaks.
//!
//! ## Capability fallback
//!
//! The cipher suite is resolved once per call from the seal author:
//! locally held keys always support the modern suite, the user's signer
//! reports its own capability. Without the modern suite the same layering
//! is produced with the legacy suite under kind 1060 with an explicit
//! `["alg", "nip04"]` marker, so a recipient never has to guess the format.
//! Falling back is not an error; only a signer with no suite at all is.

mod envelope;
mod unwrap;

pub use envelope::{resolve_suite, wrap_with_fallback, Envelope, WrapOptions, WrapParams};
pub use unwrap::unwrap;

use crate::traits::SignerError;
use thiserror::Error;

/// Result type for wrap operations
pub type WrapResult<T> = Result<T, WrapError>;

/// Wrap/unwrap errors
#[derive(Debug, Clone, Error)]
pub enum WrapError {
    #[error("No signer available for encryption")]
    SignerUnavailable,

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Invalid author key: {0}")]
    InvalidKey(String),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Event kind {0} is not an envelope")]
    NotAnEnvelope(u16),

    #[error("Unsupported envelope algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Malformed seal: {0}")]
    MalformedSeal(String),

    #[error("Rumor author {rumor} does not match seal author {seal}")]
    AuthorMismatch { seal: String, rumor: String },
}

impl From<serde_json::Error> for WrapError {
    fn from(err: serde_json::Error) -> Self {
        WrapError::Serialization(err.to_string())
    }
}
