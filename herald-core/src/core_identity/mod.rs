//! Identity module
//!
//! Key generation for locally held identities and format validation for
//! identities received from the network.

mod keypair;
mod validation;

pub use keypair::{parse_pubkey, Keypair};
pub use validation::{is_valid_pubkey, PUBKEY_HEX_LEN};

use thiserror::Error;

/// Result type for identity operations
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Identity errors
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}
