//! Publish Orchestrator
//!
//! Routes a message template to its destination scope:
//!
//! | destination   | checked before the network             | sent as                        |
//! |---------------|----------------------------------------|--------------------------------|
//! | none          | -                                      | signed event to write relays   |
//! | public group  | public-group address                   | signed event tagged `a`        |
//! | private group | private-group address, access Granted  | envelope to the group shared key |
//!
//! A mixed address list is split by visibility and both branches run. A
//! rejected branch is reported alongside the outcomes of the other one.
//! Relay failures never surface as errors; they stay in the per-relay
//! outcomes.

pub mod direct;
pub mod orchestrator;
pub mod receipts;

pub use direct::DirectPublisher;
pub use orchestrator::{BranchRejection, GroupPublishResult, PublishOptions, PublishOrchestrator};
pub use receipts::ReceiptTracker;

use crate::core_group::GroupError;
use crate::core_wrap::WrapError;
use crate::traits::SignerError;
use thiserror::Error;

/// Result type for publish operations
pub type PublishResult<T> = Result<T, PublishError>;

/// Publish errors
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("Invalid destination address: {0}")]
    InvalidAddress(String),

    #[error("Not a member of group {0}")]
    NotAMember(String),

    #[error("Missing key for group {0}")]
    MissingKey(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("No user signer available")]
    SignerUnavailable,

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Wrap error: {0}")]
    Wrap(#[from] WrapError),

    #[error("Group error: {0}")]
    Group(#[from] GroupError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        PublishError::Serialization(err.to_string())
    }
}

impl PublishError {
    /// Preconditions the caller has to fix. Anything else is a signer
    /// condition or a bug; relay failures never reach this type.
    pub fn is_validation(&self) -> bool {
        match self {
            PublishError::InvalidAddress(_)
            | PublishError::NotAMember(_)
            | PublishError::MissingKey(_)
            | PublishError::InvalidRecipient(_) => true,
            PublishError::Group(e) => e.is_validation(),
            _ => false,
        }
    }
}
