//! Seal-then-wrap construction

use super::{WrapError, WrapResult};
use crate::core_event::{
    now, tag, Event, EventTemplate, Tag, Timestamp, UnsignedEvent, KIND_GIFT_WRAP, KIND_LEGACY_WRAP,
    KIND_SEAL,
};
use crate::core_identity::{is_valid_pubkey, parse_pubkey, Keypair};
use crate::metrics::record_counter;
use crate::traits::{Author, CipherSuite, Signer};
use rand::Rng;
use tracing::debug;

/// Seal and wrap timestamps are pushed back by up to two days so the
/// envelope does not leak when the rumor was written.
const TIMESTAMP_JITTER_SECS: u64 = 2 * 24 * 60 * 60;

/// Outer-layer parameters
#[derive(Debug, Clone, Default)]
pub struct WrapParams {
    /// Recipient public key
    pub recipient: String,
    /// Key signing the outer layer. `None` uses a fresh single-use key.
    pub author: Option<Keypair>,
    /// Relays drop the envelope after this unix time
    pub expiration: Option<u64>,
    /// Extra tags on the outer layer
    pub tags: Vec<Tag>,
}

impl WrapParams {
    pub fn to(recipient: impl Into<String>) -> Self {
        Self { recipient: recipient.into(), ..Default::default() }
    }

    pub fn with_author(mut self, author: Keypair) -> Self {
        self.author = Some(author);
        self
    }

    pub fn with_expiration(mut self, expiration: u64) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }
}

/// Who seals, and how the outer layer looks
#[derive(Debug, Clone)]
pub struct WrapOptions {
    /// Seal author, the identity the recipient will see
    pub author: Author,
    pub wrap: WrapParams,
}

/// One wrapped event for one recipient
#[derive(Debug, Clone)]
pub struct Envelope {
    pub event: Event,
    pub recipient: String,
    pub suite: CipherSuite,
    /// The rumor as the recipient will see it
    pub rumor: UnsignedEvent,
}

/// Cipher suite available to `author`.
///
/// Locally held keys always support the modern suite; the user's signer
/// reports its own capability.
pub fn resolve_suite(signer: &dyn Signer, author: &Author) -> WrapResult<CipherSuite> {
    match author {
        Author::Key(_) => Ok(CipherSuite::Modern),
        Author::User => {
            if !signer.is_enabled() {
                return Err(WrapError::SignerUnavailable);
            }
            signer.capability().suite().ok_or(WrapError::SignerUnavailable)
        }
    }
}

/// Wrap `template` for a single recipient.
///
/// Produces exactly one envelope. The suite is the best one the seal
/// author supports; legacy envelopes use kind 1060 and carry
/// `["alg", "nip04"]`.
pub async fn wrap_with_fallback(
    signer: &dyn Signer,
    template: EventTemplate,
    options: &WrapOptions,
) -> WrapResult<Envelope> {
    let recipient = &options.wrap.recipient;
    if !is_valid_pubkey(recipient) {
        return Err(WrapError::InvalidRecipient(recipient.clone()));
    }
    let recipient_key =
        parse_pubkey(recipient).map_err(|_| WrapError::InvalidRecipient(recipient.clone()))?;

    let suite = resolve_suite(signer, &options.author)?;

    let author_pubkey = match &options.author {
        Author::Key(key) => key.public_key.clone(),
        Author::User => signer.user_pubkey().ok_or(WrapError::SignerUnavailable)?,
    };
    let author_key = parse_pubkey(&author_pubkey).map_err(|e| WrapError::InvalidKey(e.to_string()))?;
    let mut rumor = template.into_unsigned(author_key);
    rumor.ensure_id();

    // Seal
    let sealed_rumor = signer
        .encrypt_as(&options.author, suite, recipient, &serde_json::to_string(&rumor)?)
        .await?;
    let seal_template = EventTemplate::new(KIND_SEAL, sealed_rumor, vec![]).created_at(jittered_now());
    let seal = signer.sign_as(&options.author, seal_template).await?;

    // Wrap
    let wrap_key = options.wrap.author.clone().unwrap_or_else(Keypair::generate);
    let wrapped_seal = signer
        .encrypt_with_key(suite, &wrap_key, recipient, &serde_json::to_string(&seal)?)
        .await?;

    let kind = match suite {
        CipherSuite::Modern => KIND_GIFT_WRAP,
        CipherSuite::Legacy => KIND_LEGACY_WRAP,
    };

    let mut tags = vec![Tag::public_key(recipient_key)];
    if suite == CipherSuite::Legacy {
        tags.push(tag("alg", [suite.algorithm()]));
    }
    if let Some(expiration) = options.wrap.expiration {
        tags.push(Tag::expiration(Timestamp::from(expiration)));
    }
    tags.extend(options.wrap.tags.iter().cloned());

    let wrap_template = EventTemplate::new(kind, wrapped_seal, tags).created_at(jittered_now());
    let event = signer.sign_with_key(wrap_template, &wrap_key).await?;

    match suite {
        CipherSuite::Modern => record_counter("wrap.envelopes.modern", 1),
        CipherSuite::Legacy => record_counter("wrap.envelopes.legacy", 1),
    }
    debug!(
        event_id = %event.id,
        recipient = %recipient,
        suite = suite.algorithm(),
        rumor_kind = %rumor.kind,
        "Wrapped rumor"
    );

    Ok(Envelope { event, recipient: recipient.clone(), suite, rumor })
}

fn jittered_now() -> u64 {
    now().saturating_sub(rand::rng().random_range(0..TIMESTAMP_JITTER_SECS))
}
