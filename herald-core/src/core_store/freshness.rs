//! Freshness Store
//!
//! Process-lifetime cache of when data for an identity was last confirmed,
//! per namespace (`profile`, `relays`, ...), plus a per-identity counter of
//! stale-check cycles that went unanswered.
//!
//! # Backoff
//!
//! An identity is stale once `now - last_seen >= base_delta * (1 + attempts)`.
//! Every selection bumps `attempts`, so dead or adversarial peers are asked
//! less and less often. The only writes are monotone: `touch` keeps the max
//! timestamp and `select_stale` only increments, so overlapping loads for the
//! same identity interleave safely.

use crate::core_identity::is_valid_pubkey;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::trace;

/// Namespace for profile metadata
pub const NAMESPACE_PROFILE: &str = "profile";

/// Namespace for relay lists
pub const NAMESPACE_RELAYS: &str = "relays";

/// Namespace for group definitions
pub const NAMESPACE_GROUPS: &str = "groups";

pub struct FreshnessStore {
    /// (namespace, identity) -> last confirmed timestamp
    seen: RwLock<HashMap<(String, String), u64>>,

    /// identity -> stale cycles without confirmation
    attempts: RwLock<HashMap<String, u32>>,

    /// Clear the attempt counter when fresh data arrives
    reset_on_success: bool,
}

impl FreshnessStore {
    pub fn new(reset_on_success: bool) -> Self {
        Self {
            seen: RwLock::new(HashMap::new()),
            attempts: RwLock::new(HashMap::new()),
            reset_on_success,
        }
    }

    /// Record that data for `identity` was confirmed at `timestamp`.
    ///
    /// Never moves freshness backwards.
    pub async fn touch(&self, namespace: &str, identity: &str, timestamp: u64) {
        {
            let mut seen = self.seen.write().await;
            let entry = seen.entry((namespace.to_string(), identity.to_string())).or_insert(0);
            *entry = (*entry).max(timestamp);
        }

        if self.reset_on_success {
            self.attempts.write().await.remove(identity);
        }
    }

    /// Last confirmed timestamp
    pub async fn get(&self, namespace: &str, identity: &str) -> Option<u64> {
        self.seen
            .read()
            .await
            .get(&(namespace.to_string(), identity.to_string()))
            .copied()
    }

    /// Stale cycles counted for `identity`
    pub async fn attempts(&self, identity: &str) -> u32 {
        self.attempts.read().await.get(identity).copied().unwrap_or(0)
    }

    /// Identities that need a refetch, in input order without duplicates.
    ///
    /// Malformed identities are dropped even when `force` is set. Each
    /// selected identity has its attempt counter incremented.
    pub async fn select_stale<I, S>(
        &self,
        identities: I,
        namespace: &str,
        base_delta: u64,
        now: u64,
        force: bool,
    ) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let seen = self.seen.read().await;
        let mut attempts = self.attempts.write().await;

        let mut visited = HashSet::new();
        let mut stale = Vec::new();

        for identity in identities {
            let identity = identity.as_ref();
            if !is_valid_pubkey(identity) || !visited.insert(identity.to_string()) {
                continue;
            }

            let count = attempts.get(identity).copied().unwrap_or(0);
            if !force {
                let last = seen
                    .get(&(namespace.to_string(), identity.to_string()))
                    .copied()
                    .unwrap_or(0);
                let effective = base_delta.saturating_mul(1 + u64::from(count));
                if now.saturating_sub(last) < effective {
                    continue;
                }
            }

            attempts.insert(identity.to_string(), count.saturating_add(1));
            stale.push(identity.to_string());
        }

        trace!(namespace, candidates = visited.len(), stale = stale.len(), "Selected stale identities");
        stale
    }

    /// Undo the attempt bump of identities that were selected but never
    /// asked about, so an unroutable identity does not accrue backoff.
    pub async fn release<I, S>(&self, identities: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut attempts = self.attempts.write().await;
        for identity in identities {
            let identity = identity.as_ref();
            match attempts.get(identity).copied() {
                Some(count) if count > 1 => {
                    attempts.insert(identity.to_string(), count - 1);
                }
                Some(_) => {
                    attempts.remove(identity);
                }
                None => {}
            }
        }
    }
}

impl Default for FreshnessStore {
    fn default() -> Self {
        Self::new(true)
    }
}
