//! Group Key Lifecycle & Access State Machine
//!
//! A group is owned by an admin key generated on the creator's device.
//! Private groups also get a shared key that every member holds and that
//! member-readable content is wrapped to.
//!
//! Key material only leaves the device inside an envelope addressed to a
//! single invitee. Membership per (identity, group) moves through
//! `None -> Requested -> Granted -> Revoked | None`; see [`access`].

pub mod access;
pub mod address;
pub mod keys;
pub mod lifecycle;

pub use access::{transition, AccessEvent, AccessState, AccessStateMachine, GroupAccessStatus};
pub use address::{GroupAddress, GroupVisibility};
pub use keys::{init_group, AdminKey, GroupKeyring, InitializedGroup, SharedKey};
pub use lifecycle::{AccessOutcome, CreatedGroup, GroupManager, GroupMetadata, KeyShareRole};

use crate::core_identity::IdentityError;
use crate::core_wrap::WrapError;
use crate::traits::SignerError;
use thiserror::Error;

/// Result type for group operations
pub type GroupResult<T> = Result<T, GroupError>;

/// Group errors
#[derive(Debug, Clone, Error)]
pub enum GroupError {
    #[error("Invalid group address: {0}")]
    InvalidAddress(String),

    #[error("Not an admin of group {0}")]
    NotAdmin(String),

    #[error("No shared key for group {0}")]
    MissingSharedKey(String),

    #[error("Invalid access transition from {from:?} on {event}")]
    InvalidTransition { from: GroupAccessStatus, event: String },

    #[error("Malformed key share: {0}")]
    MalformedKeyShare(String),

    #[error("Key share for {address} not authored by the group admin")]
    UnauthorizedKeyShare { address: String },

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("No user signer available")]
    SignerUnavailable,

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Wrap error: {0}")]
    Wrap(#[from] WrapError),

    #[error("Invalid key material: {0}")]
    Key(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GroupError {
    fn from(err: serde_json::Error) -> Self {
        GroupError::Serialization(err.to_string())
    }
}

impl From<IdentityError> for GroupError {
    fn from(err: IdentityError) -> Self {
        GroupError::Key(err.to_string())
    }
}

impl GroupError {
    /// Precondition failures the caller has to fix, as opposed to signer
    /// or transport conditions
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GroupError::InvalidAddress(_)
                | GroupError::NotAdmin(_)
                | GroupError::MissingSharedKey(_)
                | GroupError::InvalidTransition { .. }
                | GroupError::InvalidRecipient(_)
        )
    }
}
