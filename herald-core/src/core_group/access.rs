/*
    access.rs - Membership access state machine

    Status per (local identity, group address):

        None ──request──▶ Requested ──key share──▶ Granted
          ▲                                           │
          └──────────────── exit ─────────────────────┤
                                                      │ evict
                                                  Revoked

    - An eviction revokes one key generation for good. A later delivery of
      that same shared key is ignored; only a share of a new key grants
      access again.
    - Keyless shares (public groups) cannot lift a revocation on their own;
      the member has to request access again first.
    - Asking for access while already granted is a caller error.

    State is kept as an LWW record so that status pushed from another of
    the user's devices merges with local transitions.
*/

use super::address::GroupAddress;
use super::{GroupError, GroupResult};
use crate::core_event::now;
use crate::core_store::VersionedRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupAccessStatus {
    #[default]
    None,
    Requested,
    Granted,
    Revoked,
}

impl GroupAccessStatus {
    /// Whether content of the group may be published or read
    pub fn is_granted(&self) -> bool {
        *self == GroupAccessStatus::Granted
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessEvent {
    /// An entry request was sent to the admin
    RequestSent,
    /// A member key share arrived; `key` is the shared public key, `None`
    /// for public groups
    KeyShareReceived { key: Option<String> },
    /// An eviction notice arrived
    Evicted,
    /// The local identity left voluntarily
    Exited,
}

impl fmt::Display for AccessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessEvent::RequestSent => f.write_str("request"),
            AccessEvent::KeyShareReceived { .. } => f.write_str("key share"),
            AccessEvent::Evicted => f.write_str("eviction"),
            AccessEvent::Exited => f.write_str("exit"),
        }
    }
}

/// Snapshot of one membership
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessState {
    pub status: GroupAccessStatus,
    /// Shared key the membership was granted with
    pub key: Option<String>,
    /// Key generation taken away by the last eviction
    pub revoked_key: Option<String>,
}

/// Field values stored in the LWW record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessField {
    Status(GroupAccessStatus),
    Key(Option<String>),
}

const FIELD_STATUS: &str = "status";
const FIELD_KEY: &str = "key";
const FIELD_REVOKED_KEY: &str = "revoked_key";

impl AccessState {
    fn from_record(record: &VersionedRecord<AccessField>) -> Self {
        let key_field = |name: &str| match record.get(name) {
            Some(AccessField::Key(key)) => key.clone(),
            _ => None,
        };
        let status = match record.get(FIELD_STATUS) {
            Some(AccessField::Status(status)) => *status,
            _ => GroupAccessStatus::None,
        };
        AccessState { status, key: key_field(FIELD_KEY), revoked_key: key_field(FIELD_REVOKED_KEY) }
    }

    fn into_fields(self) -> Vec<(String, AccessField)> {
        vec![
            (FIELD_STATUS.to_string(), AccessField::Status(self.status)),
            (FIELD_KEY.to_string(), AccessField::Key(self.key)),
            (FIELD_REVOKED_KEY.to_string(), AccessField::Key(self.revoked_key)),
        ]
    }
}

/// Next state for `event`, or `Ok(None)` when the event changes nothing
pub fn transition(state: &AccessState, event: &AccessEvent) -> GroupResult<Option<AccessState>> {
    use GroupAccessStatus as S;

    let next = match (state.status, event) {
        (S::Granted, AccessEvent::RequestSent) => {
            return Err(GroupError::InvalidTransition { from: state.status, event: event.to_string() })
        }
        (S::Requested, AccessEvent::RequestSent) => None,
        (S::None | S::Revoked, AccessEvent::RequestSent) => {
            Some(AccessState { status: S::Requested, key: None, ..state.clone() })
        }

        (_, AccessEvent::KeyShareReceived { key: Some(key) })
            if state.revoked_key.as_deref() == Some(key.as_str()) =>
        {
            None
        }
        (S::Revoked, AccessEvent::KeyShareReceived { key: None }) => None,
        (S::Granted, AccessEvent::KeyShareReceived { key }) if state.key == *key => None,
        (_, AccessEvent::KeyShareReceived { key }) => {
            Some(AccessState { status: S::Granted, key: key.clone(), ..state.clone() })
        }

        (S::Granted | S::Requested, AccessEvent::Evicted) => Some(AccessState {
            status: S::Revoked,
            key: None,
            revoked_key: state.key.clone(),
        }),
        (S::None | S::Revoked, AccessEvent::Evicted) => None,

        (S::None, AccessEvent::Exited) => None,
        (_, AccessEvent::Exited) => Some(AccessState { status: S::None, key: None, ..state.clone() }),
    };

    Ok(next)
}

/// Access records of every (identity, group) pair known locally
#[derive(Default)]
pub struct AccessStateMachine {
    records: RwLock<HashMap<(String, GroupAddress), VersionedRecord<AccessField>>>,
}

impl AccessStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status(&self, identity: &str, address: &GroupAddress) -> GroupAccessStatus {
        self.state(identity, address).await.status
    }

    pub async fn state(&self, identity: &str, address: &GroupAddress) -> AccessState {
        self.records
            .read()
            .await
            .get(&(identity.to_string(), address.clone()))
            .map(AccessState::from_record)
            .unwrap_or_default()
    }

    /// Validate `event` against the current state without applying it
    pub async fn check(&self, identity: &str, address: &GroupAddress, event: &AccessEvent) -> GroupResult<()> {
        transition(&self.state(identity, address).await, event).map(|_| ())
    }

    /// Apply `event` and return the resulting status
    pub async fn apply(
        &self,
        identity: &str,
        address: &GroupAddress,
        event: AccessEvent,
    ) -> GroupResult<GroupAccessStatus> {
        let mut records = self.records.write().await;
        let record = records.entry((identity.to_string(), address.clone())).or_default();
        let current = AccessState::from_record(record);

        match transition(&current, &event)? {
            None => {
                debug!(address = %address, status = ?current.status, event = %event, "Access unchanged");
                Ok(current.status)
            }
            Some(next) => {
                // Local transitions always win over what is stored
                let stamp = now().max(record.updated_at() + 1);
                let status = next.status;
                record.apply(stamp, next.into_fields());
                info!(address = %address, from = ?current.status, to = ?status, "Access changed");
                Ok(status)
            }
        }
    }

    /// Merge a record pushed from another device
    pub async fn merge_remote(
        &self,
        identity: &str,
        address: &GroupAddress,
        remote: &VersionedRecord<AccessField>,
    ) -> GroupAccessStatus {
        let mut records = self.records.write().await;
        let record = records.entry((identity.to_string(), address.clone())).or_default();
        record.merge(remote);
        AccessState::from_record(record).status
    }

    /// Raw record for syncing to other devices
    pub async fn record(&self, identity: &str, address: &GroupAddress) -> Option<VersionedRecord<AccessField>> {
        self.records.read().await.get(&(identity.to_string(), address.clone())).cloned()
    }
}
