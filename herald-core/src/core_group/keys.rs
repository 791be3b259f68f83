//! Group key material
//!
//! Admin and shared keys live only in this keyring. Callers get clones of
//! public data; secrets are handed out crate-internally to the signer and
//! to intentional key shares.

use super::address::{GroupAddress, GroupVisibility};
use super::{GroupError, GroupResult};
use crate::core_event::now;
use crate::core_identity::Keypair;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Authoring identity of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminKey {
    pub address: GroupAddress,
    pub keypair: Keypair,
    pub created_at: u64,
    pub relays: Vec<String>,
}

/// Key every member of a private group holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedKey {
    pub address: GroupAddress,
    pub keypair: Keypair,
    pub created_at: u64,
}

/// Output of [`init_group`]
#[derive(Debug, Clone)]
pub struct InitializedGroup {
    pub address: GroupAddress,
    pub admin: AdminKey,
    /// Present for private groups only
    pub shared: Option<SharedKey>,
}

/// Generate keys and an address for a new group
pub fn init_group(visibility: GroupVisibility, relays: Vec<String>) -> GroupResult<InitializedGroup> {
    let admin_keypair = Keypair::generate();
    let address = GroupAddress::new(
        visibility,
        admin_keypair.public_key.clone(),
        GroupAddress::generate_identifier(),
    )?;
    let created_at = now();

    let shared = match visibility {
        GroupVisibility::Private => Some(SharedKey {
            address: address.clone(),
            keypair: Keypair::generate(),
            created_at,
        }),
        GroupVisibility::Public => None,
    };

    debug!(address = %address, private = shared.is_some(), "Initialized group keys");

    Ok(InitializedGroup {
        admin: AdminKey { address: address.clone(), keypair: admin_keypair, created_at, relays },
        address,
        shared,
    })
}

/// Keys held by the local session
#[derive(Default)]
pub struct GroupKeyring {
    admin_keys: RwLock<HashMap<GroupAddress, AdminKey>>,
    shared_keys: RwLock<HashMap<GroupAddress, SharedKey>>,
}

impl GroupKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an admin key. The key must be the group's author key.
    pub async fn insert_admin_key(&self, key: AdminKey) -> GroupResult<()> {
        if key.keypair.public_key != key.address.author {
            return Err(GroupError::Key(format!(
                "admin key {} does not own {}",
                key.keypair.public_key, key.address
            )));
        }
        info!(address = %key.address, "Stored admin key");
        self.admin_keys.write().await.insert(key.address.clone(), key);
        Ok(())
    }

    /// Store the shared key of a group, replacing an older one.
    ///
    /// Returns false when the stored key is newer and the incoming one was
    /// dropped.
    pub async fn set_shared_key(&self, key: SharedKey) -> GroupResult<bool> {
        if !key.address.is_private() {
            return Err(GroupError::InvalidAddress(format!("{} is not a private group", key.address)));
        }

        let mut shared = self.shared_keys.write().await;
        if let Some(current) = shared.get(&key.address) {
            if current.keypair == key.keypair {
                return Ok(true);
            }
            if current.created_at > key.created_at {
                debug!(address = %key.address, "Ignoring older shared key");
                return Ok(false);
            }
        }
        info!(address = %key.address, pubkey = %key.keypair.public_key, "Stored shared key");
        shared.insert(key.address.clone(), key);
        Ok(true)
    }

    pub async fn remove_shared_key(&self, address: &GroupAddress) -> Option<SharedKey> {
        self.shared_keys.write().await.remove(address)
    }

    pub async fn is_admin(&self, address: &GroupAddress) -> bool {
        self.admin_keys.read().await.contains_key(address)
    }

    /// Addresses of every group this session administers
    pub async fn administered_groups(&self) -> Vec<GroupAddress> {
        let mut groups: Vec<GroupAddress> = self.admin_keys.read().await.keys().cloned().collect();
        groups.sort();
        groups
    }

    /// Relays registered with the admin key
    pub async fn admin_relays(&self, address: &GroupAddress) -> Vec<String> {
        self.admin_keys
            .read()
            .await
            .get(address)
            .map(|k| k.relays.clone())
            .unwrap_or_default()
    }

    /// Public key of the active shared key
    pub async fn shared_public_key(&self, address: &GroupAddress) -> Option<String> {
        self.shared_keys.read().await.get(address).map(|k| k.keypair.public_key.clone())
    }

    pub(crate) async fn admin_key(&self, address: &GroupAddress) -> Option<AdminKey> {
        self.admin_keys.read().await.get(address).cloned()
    }

    pub(crate) async fn shared_key(&self, address: &GroupAddress) -> Option<SharedKey> {
        self.shared_keys.read().await.get(address).cloned()
    }
}
