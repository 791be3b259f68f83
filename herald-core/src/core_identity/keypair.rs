//! Keypair module
//!
//! Local key material for group admin keys, group shared keys and
//! single-use envelope keys. Keys are secp256k1 and carried as lowercase
//! hex, the format relays and signers exchange.
//!
//! Security: the secret is zeroized on drop and redacted from `Debug`.

use super::validation::is_valid_pubkey;
use super::{IdentityError, IdentityResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Keypair holding a hex public key and its hex secret
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keypair {
    /// x-only public key, 64 lowercase hex chars
    pub public_key: String,
    /// Secret key, 64 lowercase hex chars
    secret_key: String,
}

impl Keypair {
    /// Generate a fresh random keypair
    pub fn generate() -> Self {
        let keys = nostr::Keys::generate();
        Keypair {
            public_key: keys.public_key().to_hex(),
            secret_key: keys.secret_key().to_secret_hex(),
        }
    }

    /// Rebuild a keypair from a hex secret, deriving the public key
    pub fn from_secret_hex(secret: &str) -> IdentityResult<Self> {
        if !is_valid_pubkey(secret) {
            return Err(IdentityError::InvalidSecretKey);
        }

        let keys = nostr::Keys::parse(secret).map_err(|_| IdentityError::InvalidSecretKey)?;
        Ok(Keypair {
            public_key: keys.public_key().to_hex(),
            secret_key: keys.secret_key().to_secret_hex(),
        })
    }

    /// Hex secret key. Only hand this to a signer or to an intentional key share.
    pub fn secret_hex(&self) -> &str {
        &self.secret_key
    }

    /// Signing keys for this pair. Fails only for a pair deserialized from
    /// corrupt input.
    pub fn keys(&self) -> IdentityResult<nostr::Keys> {
        nostr::Keys::parse(&self.secret_key).map_err(|_| IdentityError::InvalidSecretKey)
    }

    /// Public key as a curve point
    pub fn pubkey(&self) -> IdentityResult<nostr::PublicKey> {
        parse_pubkey(&self.public_key)
    }
}

/// Parse a hex identity into a curve point
pub fn parse_pubkey(hex: &str) -> IdentityResult<nostr::PublicKey> {
    nostr::PublicKey::from_hex(hex).map_err(|_| IdentityError::InvalidPublicKey(hex.to_string()))
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_hex_keys() {
        let kp = Keypair::generate();
        assert!(is_valid_pubkey(&kp.public_key));
        assert!(is_valid_pubkey(kp.secret_hex()));
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn test_secret_round_trip_derives_same_public_key() {
        let kp = Keypair::generate();
        let restored = Keypair::from_secret_hex(kp.secret_hex()).unwrap();
        assert_eq!(restored, kp);
    }

    #[test]
    fn test_rejects_malformed_secret() {
        assert!(Keypair::from_secret_hex("not-hex").is_err());
        assert!(Keypair::from_secret_hex(&"AB".repeat(32)).is_err());
    }

    #[test]
    fn test_keys_match_public_key() {
        let kp = Keypair::generate();
        assert_eq!(kp.keys().unwrap().public_key(), kp.pubkey().unwrap());
        assert!(parse_pubkey("zz").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let kp = Keypair::generate();
        let debug = format!("{:?}", kp);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(kp.secret_hex()));
    }
}
