//! Static relay selection for testing

use crate::core_event::Event;
use crate::core_group::GroupAddress;
use crate::traits::{merge_relays, RelaySelector};
use std::collections::HashMap;

/// Relay selector backed by fixed tables
#[derive(Debug, Clone, Default)]
pub struct StaticRelaySelector {
    write: Vec<String>,
    read: Vec<String>,
    inbox: HashMap<String, Vec<String>>,
    outbox: HashMap<String, Vec<String>>,
    groups: HashMap<GroupAddress, Vec<String>>,
    fallback: Vec<String>,
}

impl StaticRelaySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write(mut self, relays: &[&str]) -> Self {
        self.write = to_owned(relays);
        self
    }

    pub fn with_read(mut self, relays: &[&str]) -> Self {
        self.read = to_owned(relays);
        self
    }

    pub fn with_inbox(mut self, pubkey: &str, relays: &[&str]) -> Self {
        self.inbox.insert(pubkey.to_string(), to_owned(relays));
        self
    }

    pub fn with_outbox(mut self, pubkey: &str, relays: &[&str]) -> Self {
        self.outbox.insert(pubkey.to_string(), to_owned(relays));
        self
    }

    pub fn with_group(mut self, address: GroupAddress, relays: &[&str]) -> Self {
        self.groups.insert(address, to_owned(relays));
        self
    }

    /// Relays used for unknown pubkeys when fallback is allowed
    pub fn with_fallback(mut self, relays: &[&str]) -> Self {
        self.fallback = to_owned(relays);
        self
    }

    fn lookup(
        &self,
        table: &HashMap<String, Vec<String>>,
        pubkeys: &[String],
        allow_fallback: bool,
    ) -> Vec<String> {
        let selections = pubkeys.iter().map(|pk| match table.get(pk) {
            Some(relays) => relays.clone(),
            None if allow_fallback => self.fallback.clone(),
            None => Vec::new(),
        });
        merge_relays(selections, None)
    }
}

fn to_owned(relays: &[&str]) -> Vec<String> {
    relays.iter().map(|r| r.to_string()).collect()
}

impl RelaySelector for StaticRelaySelector {
    fn user_write_relays(&self) -> Vec<String> {
        self.write.clone()
    }

    fn user_read_relays(&self) -> Vec<String> {
        self.read.clone()
    }

    fn inbox_relays(&self, pubkeys: &[String], allow_fallback: bool) -> Vec<String> {
        self.lookup(&self.inbox, pubkeys, allow_fallback)
    }

    fn outbox_relays(&self, pubkeys: &[String]) -> Vec<String> {
        self.lookup(&self.outbox, pubkeys, true)
    }

    fn group_relays(&self, address: &GroupAddress) -> Vec<String> {
        self.groups.get(address).cloned().unwrap_or_default()
    }

    fn event_relays(&self, event: &Event) -> Vec<String> {
        self.outbox_relays(&[event.pubkey.to_hex()])
    }
}
