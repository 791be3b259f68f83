//! Collaborator Trait Boundaries
//!
//! The engine never talks to relays, key stores or the local database
//! directly. These traits are the narrow contracts it consumes:
//! - `Signer`: signing and per-recipient encryption (two cipher suites)
//! - `Publisher`: send one event to a set of relays
//! - `Loader`: run filters against relays and stream events back
//! - `RelaySelector`: choose relays for pubkeys, groups and events
//! - `Repository`: synchronous local event store

pub mod loader;
pub mod publisher;
pub mod relays;
pub mod repository;
pub mod signer;

pub use loader::{LoadRequest, Loader};
pub use publisher::{publish_best_effort, PublishOutcome, PublishTarget, Publisher, RelayStatus};
pub use relays::{merge_relays, RelaySelector};
pub use repository::Repository;
pub use signer::{Author, CipherCapability, CipherSuite, Signer, SignerError};

use std::sync::Arc;
use thiserror::Error;

/// Failure of a network collaborator (publisher or loader)
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Relay unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Other(String),
}

/// Handles to every external collaborator, shared by the engine components
#[derive(Clone)]
pub struct Collaborators {
    pub signer: Arc<dyn Signer>,
    pub publisher: Arc<dyn Publisher>,
    pub loader: Arc<dyn Loader>,
    pub relays: Arc<dyn RelaySelector>,
    pub repository: Arc<dyn Repository>,
}
