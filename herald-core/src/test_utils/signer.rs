//! Mock Signer for testing
//!
//! Holds real keys: events are signed with the user key (or the supplied
//! local key) and encryption runs the actual cipher suites, so layered
//! envelopes can only be opened by the intended recipient. What is mocked
//! is the signer's availability and capability.

use crate::core_event::{Event, EventTemplate};
use crate::core_identity::{parse_pubkey, Keypair};
use crate::traits::{CipherCapability, CipherSuite, Signer, SignerError};
use async_trait::async_trait;
use nostr::nips::{nip04, nip44};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct MockSigner {
    user: Keypair,
    capability: CipherCapability,
    enabled: AtomicBool,
    yielding: bool,
    signed: AtomicUsize,
}

impl MockSigner {
    /// Enabled signer with modern capability
    pub fn new() -> Self {
        Self::with_capability(CipherCapability::Modern)
    }

    pub fn with_capability(capability: CipherCapability) -> Self {
        Self::with_user(Keypair::generate(), capability)
    }

    pub fn with_user(user: Keypair, capability: CipherCapability) -> Self {
        Self {
            user,
            capability,
            enabled: AtomicBool::new(true),
            yielding: false,
            signed: AtomicUsize::new(0),
        }
    }

    /// Suspend once per operation, like a remote signer awaiting approval
    pub fn yielding(mut self) -> Self {
        self.yielding = true;
        self
    }

    /// Key the user signs with
    pub fn user(&self) -> &Keypair {
        &self.user
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Events signed so far, by any key
    pub fn signed_count(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if self.yielding {
            tokio::task::yield_now().await;
        }
    }

    fn sign(&self, template: EventTemplate, key: &Keypair) -> Result<Event, SignerError> {
        let keys = key.keys().map_err(crypto_error)?;
        let event = template
            .into_unsigned(keys.public_key())
            .sign_with_keys(&keys)
            .map_err(crypto_error)?;
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(event)
    }

    fn check_user(&self, suite: Option<CipherSuite>) -> Result<(), SignerError> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(SignerError::Disabled);
        }
        match suite {
            Some(CipherSuite::Modern) if self.capability < CipherCapability::Modern => {
                Err(SignerError::UnsupportedSuite(CipherSuite::Modern))
            }
            Some(CipherSuite::Legacy) if self.capability < CipherCapability::Legacy => {
                Err(SignerError::UnsupportedSuite(CipherSuite::Legacy))
            }
            _ => Ok(()),
        }
    }
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

fn crypto_error(e: impl std::fmt::Display) -> SignerError {
    SignerError::Crypto(e.to_string())
}

fn encrypt_for(
    suite: CipherSuite,
    key: &Keypair,
    counterparty: &str,
    plaintext: &str,
) -> Result<String, SignerError> {
    let keys = key.keys().map_err(crypto_error)?;
    let counterparty = parse_pubkey(counterparty).map_err(crypto_error)?;
    match suite {
        CipherSuite::Modern => {
            nip44::encrypt(keys.secret_key(), &counterparty, plaintext, nip44::Version::V2)
                .map_err(crypto_error)
        }
        CipherSuite::Legacy => {
            nip04::encrypt(keys.secret_key(), &counterparty, plaintext).map_err(crypto_error)
        }
    }
}

fn decrypt_from(
    suite: CipherSuite,
    key: &Keypair,
    counterparty: &str,
    ciphertext: &str,
) -> Result<String, SignerError> {
    let keys = key.keys().map_err(crypto_error)?;
    let counterparty = parse_pubkey(counterparty).map_err(crypto_error)?;
    match suite {
        CipherSuite::Modern => {
            nip44::decrypt(keys.secret_key(), &counterparty, ciphertext).map_err(crypto_error)
        }
        CipherSuite::Legacy => {
            nip04::decrypt(keys.secret_key(), &counterparty, ciphertext).map_err(crypto_error)
        }
    }
}

#[async_trait]
impl Signer for MockSigner {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn user_pubkey(&self) -> Option<String> {
        self.is_enabled().then(|| self.user.public_key.clone())
    }

    fn capability(&self) -> CipherCapability {
        self.capability
    }

    async fn sign_as_user(&self, template: EventTemplate) -> Result<Event, SignerError> {
        self.check_user(None)?;
        self.pause().await;
        self.sign(template, &self.user)
    }

    async fn sign_with_key(
        &self,
        template: EventTemplate,
        key: &Keypair,
    ) -> Result<Event, SignerError> {
        self.sign(template, key)
    }

    async fn encrypt(
        &self,
        suite: CipherSuite,
        counterparty: &str,
        plaintext: &str,
    ) -> Result<String, SignerError> {
        self.check_user(Some(suite))?;
        self.pause().await;
        encrypt_for(suite, &self.user, counterparty, plaintext)
    }

    async fn decrypt(
        &self,
        suite: CipherSuite,
        counterparty: &str,
        ciphertext: &str,
    ) -> Result<String, SignerError> {
        self.check_user(Some(suite))?;
        self.pause().await;
        decrypt_from(suite, &self.user, counterparty, ciphertext)
    }

    async fn encrypt_with_key(
        &self,
        suite: CipherSuite,
        key: &Keypair,
        counterparty: &str,
        plaintext: &str,
    ) -> Result<String, SignerError> {
        encrypt_for(suite, key, counterparty, plaintext)
    }

    async fn decrypt_with_key(
        &self,
        suite: CipherSuite,
        key: &Keypair,
        counterparty: &str,
        ciphertext: &str,
    ) -> Result<String, SignerError> {
        decrypt_from(suite, key, counterparty, ciphertext)
    }
}
