//! Envelope opening

use super::{WrapError, WrapResult};
use crate::core_event::{Event, EventExt, UnsignedEvent, KIND_GIFT_WRAP, KIND_LEGACY_WRAP, KIND_SEAL};
use crate::traits::{Author, CipherSuite, Signer};
use tracing::debug;

/// Open an envelope addressed to `recipient` and return the rumor inside.
///
/// The seal must carry a valid signature and the rumor must be authored
/// by the key that signed it; anything else is a forgery.
pub async fn unwrap(signer: &dyn Signer, recipient: &Author, event: &Event) -> WrapResult<UnsignedEvent> {
    let suite = if event.kind == KIND_GIFT_WRAP {
        CipherSuite::Modern
    } else if event.kind == KIND_LEGACY_WRAP {
        let alg = event.tag_value("alg").unwrap_or_default();
        if alg != CipherSuite::Legacy.algorithm() {
            return Err(WrapError::UnsupportedAlgorithm(alg.to_string()));
        }
        CipherSuite::Legacy
    } else {
        return Err(WrapError::NotAnEnvelope(event.kind.as_u16()));
    };

    let seal_json = signer.decrypt_as(recipient, suite, &event.author_hex(), &event.content).await?;
    let seal: Event =
        serde_json::from_str(&seal_json).map_err(|e| WrapError::MalformedSeal(e.to_string()))?;
    if seal.kind != KIND_SEAL {
        return Err(WrapError::MalformedSeal(format!("unexpected seal kind {}", seal.kind)));
    }
    seal.verify().map_err(|e| WrapError::MalformedSeal(e.to_string()))?;

    let rumor_json = signer.decrypt_as(recipient, suite, &seal.author_hex(), &seal.content).await?;
    let rumor: UnsignedEvent = serde_json::from_str(&rumor_json)?;

    if rumor.pubkey != seal.pubkey {
        return Err(WrapError::AuthorMismatch { seal: seal.author_hex(), rumor: rumor.author_hex() });
    }

    debug!(event_id = %event.id, author = %rumor.pubkey, kind = %rumor.kind, "Unwrapped envelope");
    Ok(rumor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_event::{tag, EventTemplate, Tag, KIND_DIRECT_MESSAGE, KIND_NOTE};
    use crate::core_identity::Keypair;
    use crate::core_wrap::{wrap_with_fallback, WrapOptions, WrapParams};
    use crate::test_utils::MockSigner;
    use crate::traits::CipherCapability;

    #[tokio::test]
    async fn test_round_trip_modern_and_legacy() {
        for capability in [CipherCapability::Modern, CipherCapability::Legacy] {
            let signer = MockSigner::with_capability(capability);
            let recipient = Keypair::generate();
            let options = WrapOptions { author: Author::User, wrap: WrapParams::to(recipient.public_key.clone()) };
            let template = EventTemplate::new(KIND_DIRECT_MESSAGE, "hello", vec![tag("p", ["x"])]);

            let envelope = wrap_with_fallback(&signer, template, &options).await.unwrap();
            let rumor = unwrap(&signer, &Author::Key(recipient), &envelope.event).await.unwrap();

            assert_eq!(rumor, envelope.rumor);
            assert_eq!(rumor.content, "hello");
        }
    }

    #[tokio::test]
    async fn test_rejects_non_envelope() {
        let signer = MockSigner::new();
        let event = signer.sign_as_user(EventTemplate::new(KIND_NOTE, "plain", vec![])).await.unwrap();
        let result = unwrap(&signer, &Author::User, &event).await;
        assert!(matches!(result, Err(WrapError::NotAnEnvelope(1))));
    }

    #[tokio::test]
    async fn test_rejects_forged_rumor_author() {
        let signer = MockSigner::new();
        let recipient = Keypair::generate();
        let forger = Keypair::generate();

        // Seal signed by the forger, rumor claiming to be someone else
        let claimed = Keypair::generate().pubkey().unwrap();
        let rumor = EventTemplate::new(KIND_NOTE, "hi", vec![]).into_unsigned(claimed);
        let sealed = signer
            .encrypt_with_key(CipherSuite::Modern, &forger, &recipient.public_key, &serde_json::to_string(&rumor).unwrap())
            .await
            .unwrap();
        let seal = signer.sign_with_key(EventTemplate::new(KIND_SEAL, sealed, vec![]), &forger).await.unwrap();

        let wrap_key = Keypair::generate();
        let wrapped = signer
            .encrypt_with_key(CipherSuite::Modern, &wrap_key, &recipient.public_key, &serde_json::to_string(&seal).unwrap())
            .await
            .unwrap();
        let event = signer
            .sign_with_key(
                EventTemplate::new(KIND_GIFT_WRAP, wrapped, vec![Tag::public_key(recipient.pubkey().unwrap())]),
                &wrap_key,
            )
            .await
            .unwrap();

        let result = unwrap(&signer, &Author::Key(recipient), &event).await;
        assert!(matches!(result, Err(WrapError::AuthorMismatch { .. })));
    }

    #[tokio::test]
    async fn test_legacy_envelope_requires_marker() {
        let signer = MockSigner::with_capability(CipherCapability::Legacy);
        let recipient = Keypair::generate();
        let options = WrapOptions { author: Author::User, wrap: WrapParams::to(recipient.public_key.clone()) };

        let mut envelope = wrap_with_fallback(&signer, EventTemplate::new(KIND_NOTE, "x", vec![]), &options)
            .await
            .unwrap();
        envelope.event.tags.retain(|t| t.as_slice()[0] != "alg");

        let result = unwrap(&signer, &Author::Key(recipient), &envelope.event).await;
        assert!(matches!(result, Err(WrapError::UnsupportedAlgorithm(_))));
    }

    #[tokio::test]
    async fn test_rejects_seal_with_bad_signature() {
        let signer = MockSigner::new();
        let recipient = Keypair::generate();
        let author = Keypair::generate();

        let rumor = EventTemplate::new(KIND_NOTE, "hi", vec![]).into_unsigned(author.pubkey().unwrap());
        let sealed = signer
            .encrypt_with_key(CipherSuite::Modern, &author, &recipient.public_key, &serde_json::to_string(&rumor).unwrap())
            .await
            .unwrap();
        let mut seal = signer.sign_with_key(EventTemplate::new(KIND_SEAL, sealed, vec![]), &author).await.unwrap();
        seal.created_at = seal.created_at + 1u64;

        let wrap_key = Keypair::generate();
        let wrapped = signer
            .encrypt_with_key(CipherSuite::Modern, &wrap_key, &recipient.public_key, &serde_json::to_string(&seal).unwrap())
            .await
            .unwrap();
        let event = signer
            .sign_with_key(EventTemplate::new(KIND_GIFT_WRAP, wrapped, vec![]), &wrap_key)
            .await
            .unwrap();

        let result = unwrap(&signer, &Author::Key(recipient), &event).await;
        assert!(matches!(result, Err(WrapError::MalformedSeal(_))));
    }
}
