//! Signer Trait
//!
//! Signing and per-recipient encryption. The user's own key may live behind
//! a browser extension or a remote approver, so every operation may suspend.
//! Locally held keys (group keys, envelope keys) go through the `*_with_key`
//! variants.

use crate::core_event::{Event, EventTemplate};
use crate::core_identity::Keypair;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named cipher suites for per-recipient encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherSuite {
    /// Versioned, padded, authenticated encryption
    Modern,
    /// Older shared-secret scheme, kept for signers that lack `Modern`
    Legacy,
}

impl CipherSuite {
    /// Algorithm marker carried on envelopes
    pub fn algorithm(&self) -> &'static str {
        match self {
            CipherSuite::Modern => "nip44",
            CipherSuite::Legacy => "nip04",
        }
    }
}

/// What a signing identity can encrypt with, resolved once per operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CipherCapability {
    None,
    Legacy,
    Modern,
}

impl CipherCapability {
    /// Best suite available under this capability
    pub fn suite(&self) -> Option<CipherSuite> {
        match self {
            CipherCapability::None => None,
            CipherCapability::Legacy => Some(CipherSuite::Legacy),
            CipherCapability::Modern => Some(CipherSuite::Modern),
        }
    }
}

/// Who signs and encrypts a layer
#[derive(Debug, Clone)]
pub enum Author {
    /// The logged-in user's signer
    User,
    /// A key held in local memory
    Key(Keypair),
}

/// Signer errors
#[derive(Debug, Clone, Error)]
pub enum SignerError {
    #[error("Signer is not enabled")]
    Disabled,

    #[error("Signing request rejected: {0}")]
    Rejected(String),

    #[error("Cipher suite {0:?} not supported")]
    UnsupportedSuite(CipherSuite),

    #[error("Crypto error: {0}")]
    Crypto(String),
}

#[async_trait]
pub trait Signer: Send + Sync {
    /// Whether a user signer is available at all
    fn is_enabled(&self) -> bool;

    /// The logged-in user's public key
    fn user_pubkey(&self) -> Option<String>;

    /// Suites the user signer supports
    fn capability(&self) -> CipherCapability;

    /// Sign a template with the user's key
    async fn sign_as_user(&self, template: EventTemplate) -> Result<Event, SignerError>;

    /// Sign a template with a locally held key
    async fn sign_with_key(
        &self,
        template: EventTemplate,
        key: &Keypair,
    ) -> Result<Event, SignerError>;

    /// Encrypt for `counterparty` with the user's key
    async fn encrypt(
        &self,
        suite: CipherSuite,
        counterparty: &str,
        plaintext: &str,
    ) -> Result<String, SignerError>;

    /// Decrypt from `counterparty` with the user's key
    async fn decrypt(
        &self,
        suite: CipherSuite,
        counterparty: &str,
        ciphertext: &str,
    ) -> Result<String, SignerError>;

    /// Encrypt for `counterparty` with a locally held key
    async fn encrypt_with_key(
        &self,
        suite: CipherSuite,
        key: &Keypair,
        counterparty: &str,
        plaintext: &str,
    ) -> Result<String, SignerError>;

    /// Decrypt from `counterparty` with a locally held key
    async fn decrypt_with_key(
        &self,
        suite: CipherSuite,
        key: &Keypair,
        counterparty: &str,
        ciphertext: &str,
    ) -> Result<String, SignerError>;

    /// Sign as `author`
    async fn sign_as(
        &self,
        author: &Author,
        template: EventTemplate,
    ) -> Result<Event, SignerError> {
        match author {
            Author::User => self.sign_as_user(template).await,
            Author::Key(key) => self.sign_with_key(template, key).await,
        }
    }

    /// Encrypt as `author`
    async fn encrypt_as(
        &self,
        author: &Author,
        suite: CipherSuite,
        counterparty: &str,
        plaintext: &str,
    ) -> Result<String, SignerError> {
        match author {
            Author::User => self.encrypt(suite, counterparty, plaintext).await,
            Author::Key(key) => self.encrypt_with_key(suite, key, counterparty, plaintext).await,
        }
    }

    /// Decrypt as `author`
    async fn decrypt_as(
        &self,
        author: &Author,
        suite: CipherSuite,
        counterparty: &str,
        ciphertext: &str,
    ) -> Result<String, SignerError> {
        match author {
            Author::User => self.decrypt(suite, counterparty, ciphertext).await,
            Author::Key(key) => self.decrypt_with_key(suite, key, counterparty, ciphertext).await,
        }
    }
}
