//! Profile index
//!
//! Profiles arrive as kind-0 events whose content is a JSON object. Several
//! relays answer the same query in arbitrary order, so each top-level JSON
//! field is merged with the LWW rule instead of replacing the whole profile.

use super::record::VersionedRecord;
use crate::core_event::{Event, KIND_PROFILE};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Profile field values keyed by author
#[derive(Default)]
pub struct ProfileIndex {
    profiles: RwLock<HashMap<String, VersionedRecord<Value>>>,
}

impl ProfileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a kind-0 event. Returns the number of fields that changed.
    ///
    /// Other kinds and content that is not a JSON object are ignored.
    pub async fn apply_event(&self, event: &Event) -> usize {
        if event.kind != KIND_PROFILE {
            return 0;
        }

        match serde_json::from_str::<Value>(&event.content) {
            Ok(Value::Object(fields)) => {
                self.apply_fields(&event.pubkey.to_hex(), event.created_at.as_u64(), fields).await
            }
            _ => {
                debug!(event_id = %event.id, author = %event.pubkey, "Ignoring malformed profile content");
                0
            }
        }
    }

    /// Merge raw profile fields stamped with `timestamp`
    pub async fn apply_fields(&self, pubkey: &str, timestamp: u64, fields: Map<String, Value>) -> usize {
        let mut profiles = self.profiles.write().await;
        profiles.entry(pubkey.to_string()).or_default().apply(timestamp, fields)
    }

    /// Versioned profile of `pubkey`
    pub async fn get(&self, pubkey: &str) -> Option<VersionedRecord<Value>> {
        self.profiles.read().await.get(pubkey).cloned()
    }

    /// Profile of `pubkey` flattened back to a JSON object
    pub async fn get_json(&self, pubkey: &str) -> Option<Value> {
        let profiles = self.profiles.read().await;
        profiles.get(pubkey).map(|record| {
            Value::Object(
                record
                    .iter()
                    .map(|(field, entry)| (field.to_string(), entry.value.clone()))
                    .collect(),
            )
        })
    }

    /// Record-level timestamp of `pubkey`'s profile
    pub async fn updated_at(&self, pubkey: &str) -> Option<u64> {
        self.profiles.read().await.get(pubkey).map(VersionedRecord::updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_event::KIND_NOTE;
    use crate::core_identity::Keypair;
    use crate::test_utils::test_event;
    use serde_json::json;

    fn profile_event(author: &Keypair, created_at: u64, content: Value) -> Event {
        test_event(KIND_PROFILE, author, created_at, vec![], &content.to_string())
    }

    #[tokio::test]
    async fn test_out_of_order_profiles_converge() {
        let index = ProfileIndex::new();
        let alice = Keypair::generate();
        let newer = profile_event(&alice, 200, json!({"name": "Alice", "about": "new"}));
        let older = profile_event(&alice, 100, json!({"name": "alice_old", "picture": "p.png"}));

        index.apply_event(&newer).await;
        index.apply_event(&older).await;

        let profile = index.get_json(&alice.public_key).await.unwrap();
        assert_eq!(profile["name"], "Alice");
        assert_eq!(profile["about"], "new");
        // Field only present in the older event still lands
        assert_eq!(profile["picture"], "p.png");
        assert_eq!(index.updated_at(&alice.public_key).await, Some(200));
    }

    #[tokio::test]
    async fn test_malformed_content_ignored() {
        let index = ProfileIndex::new();
        let bob = Keypair::generate();
        let event = test_event(KIND_PROFILE, &bob, 1, vec![], "not json");
        assert_eq!(index.apply_event(&event).await, 0);
        assert!(index.get(&bob.public_key).await.is_none());
    }

    #[tokio::test]
    async fn test_non_profile_kind_ignored() {
        let index = ProfileIndex::new();
        let carol = Keypair::generate();
        let event = test_event(KIND_NOTE, &carol, 1, vec![], &json!({"name": "Carol"}).to_string());
        assert_eq!(index.apply_event(&event).await, 0);
    }
}
