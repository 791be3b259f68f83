//! Direct messages and profile updates
//!
//! Both are user-authored and routed by the user's own relay lists rather
//! than by a group.

use super::{PublishError, PublishResult};
use crate::config::Config;
use crate::core_event::{now, tag, EventTemplate, KIND_DIRECT_MESSAGE, KIND_PROFILE};
use crate::core_identity::parse_pubkey;
use crate::core_store::ProfileIndex;
use crate::core_wrap::{wrap_with_fallback, WrapOptions, WrapParams};
use crate::metrics::record_counter;
use crate::traits::{merge_relays, publish_best_effort, Author, Collaborators, PublishOutcome, PublishTarget};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub struct DirectPublisher {
    collab: Collaborators,
    config: Arc<Config>,
    profiles: Arc<ProfileIndex>,
}

impl DirectPublisher {
    pub fn new(collab: Collaborators, config: Arc<Config>, profiles: Arc<ProfileIndex>) -> Self {
        Self { collab, config, profiles }
    }

    /// Send `content` to `recipients`.
    ///
    /// Every participant, the sender included, gets their own envelope of
    /// the same rumor on their inbox relays. Outcomes are in the order the
    /// participants were given, the sender's copy last.
    pub async fn send_direct_message(&self, recipients: &[String], content: &str) -> PublishResult<Vec<PublishOutcome>> {
        if recipients.is_empty() {
            return Err(PublishError::InvalidRecipient("no recipients".to_string()));
        }
        if let Some(bad) = recipients.iter().find(|r| parse_pubkey(r).is_err()) {
            return Err(PublishError::InvalidRecipient(bad.clone()));
        }
        let user = self.collab.signer.user_pubkey().ok_or(PublishError::SignerUnavailable)?;

        let mut participants: Vec<String> = Vec::with_capacity(recipients.len() + 1);
        for pubkey in recipients.iter().chain(std::iter::once(&user)) {
            if !participants.contains(pubkey) {
                participants.push(pubkey.clone());
            }
        }

        let tags = recipients.iter().map(|r| tag("p", [r.as_str()])).collect();
        let template = EventTemplate::new(KIND_DIRECT_MESSAGE, content, tags);

        let mut targets = Vec::with_capacity(participants.len());
        for pubkey in &participants {
            let options = WrapOptions { author: Author::User, wrap: WrapParams::to(pubkey.clone()) };
            let envelope = wrap_with_fallback(self.collab.signer.as_ref(), template.clone(), &options).await?;
            let relays = merge_relays(
                vec![self.collab.relays.inbox_relays(std::slice::from_ref(pubkey), true)],
                self.config.relays.max_relays_per_target,
            );
            targets.push(PublishTarget { event: envelope.event, relays });
        }

        let publisher = self.collab.publisher.as_ref();
        let outcomes = join_all(targets.iter().map(|t| publish_best_effort(publisher, t))).await;

        debug!(participants = participants.len(), "Sent direct message");
        Ok(outcomes)
    }

    /// Publish the user's profile with `fields` merged over the locally
    /// known version
    pub async fn publish_profile(&self, fields: Map<String, Value>) -> PublishResult<PublishOutcome> {
        let signer = self.collab.signer.as_ref();
        if !signer.is_enabled() {
            return Err(PublishError::SignerUnavailable);
        }
        let user = signer.user_pubkey().ok_or(PublishError::SignerUnavailable)?;

        let mut profile = match self.profiles.get_json(&user).await {
            Some(Value::Object(existing)) => existing,
            _ => Map::new(),
        };
        profile.extend(fields);

        // Local edits must win over whatever is stored, even within one second
        let stamp = now().max(self.profiles.updated_at(&user).await.map_or(0, |t| t + 1));
        let template =
            EventTemplate::new(KIND_PROFILE, serde_json::to_string(&Value::Object(profile))?, vec![]).created_at(stamp);
        let event = signer.sign_as_user(template).await?;
        record_counter("publish.events.signed", 1);
        self.profiles.apply_event(&event).await;

        let relays = merge_relays(
            vec![self.collab.relays.user_write_relays(), self.config.relays.platform_relays.clone()],
            self.config.relays.max_relays_per_target,
        );
        let target = PublishTarget { event, relays };
        let outcome = publish_best_effort(self.collab.publisher.as_ref(), &target).await;

        info!(event_id = %outcome.event_id, "Published profile");
        Ok(outcome)
    }
}
