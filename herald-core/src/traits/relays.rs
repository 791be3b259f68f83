//! Relay Selection Trait
//!
//! Scoring is external; the engine only asks for ordered, policy-filtered
//! relay lists and merges them.

use crate::core_event::Event;
use crate::core_group::GroupAddress;
use std::collections::{BTreeMap, HashSet};

pub trait RelaySelector: Send + Sync {
    /// Relays the user publishes to
    fn user_write_relays(&self) -> Vec<String>;

    /// Relays the user reads from
    fn user_read_relays(&self) -> Vec<String>;

    /// Inbox relays of `pubkeys`. With `allow_fallback == false` an unknown
    /// pubkey contributes nothing instead of arbitrary default relays.
    fn inbox_relays(&self, pubkeys: &[String], allow_fallback: bool) -> Vec<String>;

    /// Outbox relays of `pubkeys`
    fn outbox_relays(&self, pubkeys: &[String]) -> Vec<String>;

    /// Relays hosting a group
    fn group_relays(&self, address: &GroupAddress) -> Vec<String>;

    /// Relays an event is likely to be found on
    fn event_relays(&self, event: &Event) -> Vec<String>;

    /// Split `pubkeys` by the relay best positioned to serve each one
    fn partition_by_outbox(&self, pubkeys: &[String]) -> Vec<(String, Vec<String>)> {
        let mut partitions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for pubkey in pubkeys {
            for relay in self.outbox_relays(std::slice::from_ref(pubkey)) {
                partitions.entry(relay).or_default().push(pubkey.clone());
            }
        }
        partitions.into_iter().collect()
    }
}

/// Merge several relay selections preserving first-seen order.
///
/// Urls are normalised (trimmed, trailing slash dropped) before
/// de-duplication. `limit` caps the merged list.
pub fn merge_relays<I>(selections: I, limit: Option<usize>) -> Vec<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for relay in selections.into_iter().flatten() {
        let normalized = normalize_relay_url(&relay);
        if normalized.is_empty() || !seen.insert(normalized.clone()) {
            continue;
        }
        merged.push(normalized);
        if limit.is_some_and(|l| merged.len() >= l) {
            break;
        }
    }

    merged
}

fn normalize_relay_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
