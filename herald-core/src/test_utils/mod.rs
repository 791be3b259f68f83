//! Test utilities and in-memory collaborators
//!
//! Used by unit tests, the integration tests under `tests/` and the CLI's
//! offline commands.

pub mod network;
pub mod relays;
pub mod repository;
pub mod signer;

pub use network::{MemoryLoader, MemoryPublisher, PublishedEvent};
pub use relays::StaticRelaySelector;
pub use repository::MemoryRepository;
pub use signer::MockSigner;

use crate::core_event::{Event, EventTemplate, Kind, Tag};
use crate::core_identity::Keypair;
use crate::traits::Collaborators;
use std::sync::Arc;

/// Concrete handles to every mock, plus the trait-object bundle the
/// engine consumes
pub struct TestNetwork {
    pub signer: Arc<MockSigner>,
    pub publisher: Arc<MemoryPublisher>,
    pub loader: Arc<MemoryLoader>,
    pub relays: Arc<StaticRelaySelector>,
    pub repository: Arc<MemoryRepository>,
}

impl TestNetwork {
    pub fn new(signer: MockSigner, relays: StaticRelaySelector) -> Self {
        Self {
            signer: Arc::new(signer),
            publisher: Arc::new(MemoryPublisher::new()),
            loader: Arc::new(MemoryLoader::new()),
            relays: Arc::new(relays),
            repository: Arc::new(MemoryRepository::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            signer: self.signer.clone(),
            publisher: self.publisher.clone(),
            loader: self.loader.clone(),
            relays: self.relays.clone(),
            repository: self.repository.clone(),
        }
    }

    /// The mock user's public key
    pub fn user_pubkey(&self) -> String {
        self.signer.user().public_key.clone()
    }
}

/// Event signed by `author`, for feeding loaders and repositories
pub fn test_event(kind: Kind, author: &Keypair, created_at: u64, tags: Vec<Tag>, content: &str) -> Event {
    let keys = author.keys().expect("generated keypair");
    EventTemplate::new(kind, content, tags)
        .created_at(created_at)
        .into_unsigned(keys.public_key())
        .sign_with_keys(&keys)
        .expect("sign test event")
}
