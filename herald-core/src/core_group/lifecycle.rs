//! Group lifecycle
//!
//! Creating groups, asking for and leaving access, and distributing key
//! shares. Every key share is a kind-24 rumor wrapped to one recipient and
//! sealed by the admin key, so recipients can check it came from the
//! group's owner:
//!
//! | share    | tags                                                   |
//! |----------|--------------------------------------------------------|
//! | admin    | `a`, `["role","admin"]`, `privkey` (admin), `relay`... |
//! | member   | `a`, `["role","member"]`, `privkey` (shared, private groups only), optional `grace_period` |
//! | eviction | `a`, `["action","evict"]`, no key material             |

use super::access::{transition, AccessEvent, AccessStateMachine, GroupAccessStatus};
use super::address::{GroupAddress, GroupVisibility};
use super::keys::{init_group, AdminKey, GroupKeyring, SharedKey};
use super::{GroupError, GroupResult};
use crate::config::Config;
use crate::core_event::{
    now, tag, Event, EventExt, EventTemplate, Tag, UnsignedEvent, KIND_GROUP_EXIT_REQUEST,
    KIND_GROUP_JOIN_REQUEST, KIND_GROUP_KEY_SHARE,
};
use crate::core_identity::{parse_pubkey, Keypair};
use crate::core_wrap::{unwrap, wrap_with_fallback, WrapOptions, WrapParams};
use crate::metrics::record_counter;
use crate::traits::{
    merge_relays, publish_best_effort, Author, Collaborators, PublishOutcome, PublishTarget,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TAG_RELAY: &str = "relay";
const TAG_ROLE: &str = "role";
const TAG_PRIVKEY: &str = "privkey";
const TAG_GRACE_PERIOD: &str = "grace_period";
const TAG_ACTION: &str = "action";
const ACTION_EVICT: &str = "evict";

/// Which key a share carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShareRole {
    Admin,
    Member,
}

impl KeyShareRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyShareRole::Admin => "admin",
            KeyShareRole::Member => "member",
        }
    }
}

/// Content of a group definition event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Result of [`GroupManager::create_group`]
#[derive(Debug, Clone)]
pub struct CreatedGroup {
    pub address: GroupAddress,
    /// Outcome of publishing the group definition
    pub definition: PublishOutcome,
    /// Admin key backup sent to the creator's own inbox
    pub admin_shares: Vec<PublishOutcome>,
}

/// Access status after a request or exit, with the dispatch outcomes
#[derive(Debug, Clone)]
pub struct AccessOutcome {
    pub status: GroupAccessStatus,
    pub outcomes: Vec<PublishOutcome>,
}

pub struct GroupManager {
    collab: Collaborators,
    config: Arc<Config>,
    keyring: Arc<GroupKeyring>,
    access: Arc<AccessStateMachine>,
}

impl GroupManager {
    pub fn new(
        collab: Collaborators,
        config: Arc<Config>,
        keyring: Arc<GroupKeyring>,
        access: Arc<AccessStateMachine>,
    ) -> Self {
        Self { collab, config, keyring, access }
    }

    pub fn keyring(&self) -> &Arc<GroupKeyring> {
        &self.keyring
    }

    pub fn access(&self) -> &Arc<AccessStateMachine> {
        &self.access
    }

    /// Generate keys for a new group, announce it and grant ourselves access
    pub async fn create_group(
        &self,
        visibility: GroupVisibility,
        metadata: GroupMetadata,
        relays: Vec<String>,
    ) -> GroupResult<CreatedGroup> {
        let user = self.user_pubkey()?;
        let group = init_group(visibility, relays.clone())?;
        let address = group.address.clone();

        self.keyring.insert_admin_key(group.admin.clone()).await?;
        let shared_pubkey = group.shared.as_ref().map(|s| s.keypair.public_key.clone());
        if let Some(shared) = group.shared {
            self.keyring.set_shared_key(shared).await?;
        }

        let mut tags = vec![Tag::identifier(address.identifier.clone()), tag("name", [metadata.name.as_str()])];
        tags.extend(relays.iter().map(|r| tag(TAG_RELAY, [r.as_str()])));
        let template = EventTemplate::new(address.kind(), serde_json::to_string(&metadata)?, tags);
        let event = self.collab.signer.sign_with_key(template, &group.admin.keypair).await?;
        record_counter("publish.events.signed", 1);

        let target = PublishTarget {
            event,
            relays: merge_relays(
                vec![relays, self.config.relays.platform_relays.clone()],
                self.config.relays.max_relays_per_target,
            ),
        };
        let definition = publish_best_effort(self.collab.publisher.as_ref(), &target).await;

        self.access
            .apply(&user, &address, AccessEvent::KeyShareReceived { key: shared_pubkey })
            .await?;
        let admin_shares = self.publish_admin_key_shares(&address, &[user]).await?;

        info!(address = %address, "Created group");
        Ok(CreatedGroup { address, definition, admin_shares })
    }

    /// Ask the admin for access.
    ///
    /// When we hold the admin key ourselves the request short-circuits: a
    /// member share is sent to our own inbox and access is granted at once.
    pub async fn request_access(&self, address: &GroupAddress, message: &str) -> GroupResult<AccessOutcome> {
        let user = self.user_pubkey()?;

        if self.keyring.is_admin(address).await {
            let outcomes = self.publish_member_key_shares(address, &[user.clone()], None).await?;
            let key = self.keyring.shared_public_key(address).await;
            let status = self.access.apply(&user, address, AccessEvent::KeyShareReceived { key }).await?;
            debug!(address = %address, "Admin self-invite");
            return Ok(AccessOutcome { status, outcomes });
        }

        self.access.check(&user, address, &AccessEvent::RequestSent).await?;

        let template = EventTemplate::new(KIND_GROUP_JOIN_REQUEST, message, vec![address.tag()]);
        let outcome = self.send_wrapped(template, &Author::User, &address.author, address, &[]).await?;
        let status = self.access.apply(&user, address, AccessEvent::RequestSent).await?;

        Ok(AccessOutcome { status, outcomes: vec![outcome] })
    }

    /// Tell the admin we are leaving and drop our copy of the shared key
    pub async fn exit_group(&self, address: &GroupAddress, message: &str) -> GroupResult<AccessOutcome> {
        let user = self.user_pubkey()?;

        let template = EventTemplate::new(KIND_GROUP_EXIT_REQUEST, message, vec![address.tag()]);
        let outcome = self.send_wrapped(template, &Author::User, &address.author, address, &[]).await?;

        let status = self.access.apply(&user, address, AccessEvent::Exited).await?;
        if !self.keyring.is_admin(address).await {
            self.keyring.remove_shared_key(address).await;
        }

        Ok(AccessOutcome { status, outcomes: vec![outcome] })
    }

    /// Share the admin key with `recipients`
    pub async fn publish_admin_key_shares(
        &self,
        address: &GroupAddress,
        recipients: &[String],
    ) -> GroupResult<Vec<PublishOutcome>> {
        let admin = self.admin_key(address).await?;

        let mut tags = vec![
            address.tag(),
            tag(TAG_ROLE, [KeyShareRole::Admin.as_str()]),
            tag(TAG_PRIVKEY, [admin.keypair.secret_hex()]),
        ];
        tags.extend(admin.relays.iter().map(|r| tag(TAG_RELAY, [r.as_str()])));

        self.fan_out(&admin, recipients, EventTemplate::new(KIND_GROUP_KEY_SHARE, "", tags)).await
    }

    /// Invite `recipients` as members. Private groups get the shared key.
    pub async fn publish_member_key_shares(
        &self,
        address: &GroupAddress,
        recipients: &[String],
        grace_period: Option<Duration>,
    ) -> GroupResult<Vec<PublishOutcome>> {
        let admin = self.admin_key(address).await?;

        let mut tags = vec![address.tag(), tag(TAG_ROLE, [KeyShareRole::Member.as_str()])];
        if address.is_private() {
            let shared = self
                .keyring
                .shared_key(address)
                .await
                .ok_or_else(|| GroupError::MissingSharedKey(address.to_string()))?;
            tags.push(tag(TAG_PRIVKEY, [shared.keypair.secret_hex()]));
        }
        if let Some(grace) = grace_period {
            tags.push(tag(TAG_GRACE_PERIOD, [grace.as_secs().to_string()]));
        }

        self.fan_out(&admin, recipients, EventTemplate::new(KIND_GROUP_KEY_SHARE, "", tags)).await
    }

    /// Notify `recipients` that their access is revoked
    pub async fn publish_evictions(
        &self,
        address: &GroupAddress,
        recipients: &[String],
    ) -> GroupResult<Vec<PublishOutcome>> {
        let admin = self.admin_key(address).await?;
        let tags = vec![address.tag(), tag(TAG_ACTION, [ACTION_EVICT])];

        self.fan_out(&admin, recipients, EventTemplate::new(KIND_GROUP_KEY_SHARE, "", tags)).await
    }

    /// Open an envelope addressed to the user and apply the key share inside
    pub async fn receive_envelope(&self, event: &Event) -> GroupResult<GroupAccessStatus> {
        let rumor = unwrap(self.collab.signer.as_ref(), &Author::User, event).await?;
        self.handle_key_share(&rumor).await
    }

    /// Apply a key share received by the user
    pub async fn handle_key_share(&self, rumor: &UnsignedEvent) -> GroupResult<GroupAccessStatus> {
        if rumor.kind != KIND_GROUP_KEY_SHARE {
            return Err(GroupError::MalformedKeyShare(format!("unexpected kind {}", rumor.kind)));
        }

        let address: GroupAddress = rumor
            .tag_value("a")
            .ok_or_else(|| GroupError::MalformedKeyShare("missing group address".to_string()))?
            .parse()?;
        if rumor.author_hex() != address.author {
            warn!(address = %address, sender = %rumor.pubkey, "Rejected key share from non-admin");
            return Err(GroupError::UnauthorizedKeyShare { address: address.to_string() });
        }

        let user = self.user_pubkey()?;

        if rumor.tag_value(TAG_ACTION) == Some(ACTION_EVICT) {
            let status = self.access.apply(&user, &address, AccessEvent::Evicted).await?;
            self.keyring.remove_shared_key(&address).await;
            return Ok(status);
        }

        match rumor.tag_value(TAG_ROLE) {
            Some("admin") => {
                let keypair = self.share_keypair(rumor)?;
                let relays = rumor.tag_values(TAG_RELAY).into_iter().map(String::from).collect();
                let created_at = rumor.created_at.as_u64();
                self.keyring
                    .insert_admin_key(AdminKey { address: address.clone(), keypair, created_at, relays })
                    .await?;
                Ok(self.access.status(&user, &address).await)
            }
            Some("member") => {
                if !address.is_private() {
                    return self.access.apply(&user, &address, AccessEvent::KeyShareReceived { key: None }).await;
                }

                let keypair = self.share_keypair(rumor)?;
                let event = AccessEvent::KeyShareReceived { key: Some(keypair.public_key.clone()) };
                let current = self.access.state(&user, &address).await;
                if transition(&current, &event)?.is_none() {
                    // Revoked generation or a key we already hold
                    return Ok(current.status);
                }

                let share = SharedKey { address: address.clone(), keypair, created_at: rumor.created_at.as_u64() };
                if !self.keyring.set_shared_key(share).await? {
                    return Ok(current.status);
                }
                self.access.apply(&user, &address, event).await
            }
            other => Err(GroupError::MalformedKeyShare(format!("unknown role {:?}", other))),
        }
    }

    fn user_pubkey(&self) -> GroupResult<String> {
        self.collab.signer.user_pubkey().ok_or(GroupError::SignerUnavailable)
    }

    async fn admin_key(&self, address: &GroupAddress) -> GroupResult<AdminKey> {
        self.keyring
            .admin_key(address)
            .await
            .ok_or_else(|| GroupError::NotAdmin(address.to_string()))
    }

    fn share_keypair(&self, rumor: &UnsignedEvent) -> GroupResult<Keypair> {
        let secret = rumor
            .tag_value(TAG_PRIVKEY)
            .ok_or_else(|| GroupError::MalformedKeyShare("missing key".to_string()))?;
        Ok(Keypair::from_secret_hex(secret)?)
    }

    /// Recipient inbox relays (no fallback), then group relays, then platform relays
    fn recipient_relays(&self, recipient: &str, address: &GroupAddress, admin_relays: &[String]) -> Vec<String> {
        merge_relays(
            vec![
                self.collab.relays.inbox_relays(&[recipient.to_string()], false),
                self.collab.relays.group_relays(address),
                admin_relays.to_vec(),
                self.config.relays.platform_relays.clone(),
            ],
            self.config.relays.max_relays_per_target,
        )
    }

    async fn send_wrapped(
        &self,
        template: EventTemplate,
        author: &Author,
        recipient: &str,
        address: &GroupAddress,
        admin_relays: &[String],
    ) -> GroupResult<PublishOutcome> {
        let expiration = now() + self.config.wrap.key_share_expiration.as_secs();
        let options = WrapOptions {
            author: author.clone(),
            wrap: WrapParams::to(recipient).with_expiration(expiration),
        };
        let envelope = wrap_with_fallback(self.collab.signer.as_ref(), template, &options).await?;

        let target = PublishTarget {
            relays: self.recipient_relays(recipient, address, admin_relays),
            event: envelope.event,
        };
        Ok(publish_best_effort(self.collab.publisher.as_ref(), &target).await)
    }

    /// Wrap `template` once per recipient under the admin key and dispatch
    /// all of them concurrently
    async fn fan_out(
        &self,
        admin: &AdminKey,
        recipients: &[String],
        template: EventTemplate,
    ) -> GroupResult<Vec<PublishOutcome>> {
        if let Some(bad) = recipients.iter().find(|r| parse_pubkey(r).is_err()) {
            return Err(GroupError::InvalidRecipient(bad.clone()));
        }

        let author = Author::Key(admin.keypair.clone());
        let sends = recipients.iter().map(|recipient| {
            self.send_wrapped(template.clone(), &author, recipient, &admin.address, &admin.relays)
        });
        let outcomes = join_all(sends).await.into_iter().collect::<GroupResult<Vec<_>>>()?;

        record_counter("groups.key_shares.sent", outcomes.len() as u64);
        debug!(address = %admin.address, recipients = recipients.len(), "Key shares dispatched");
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_event::KIND_GIFT_WRAP;
    use crate::test_utils::{MockSigner, StaticRelaySelector, TestNetwork};

    fn network() -> TestNetwork {
        TestNetwork::new(MockSigner::new(), StaticRelaySelector::new().with_write(&["wss://write"]))
    }

    fn manager(net: &TestNetwork) -> GroupManager {
        let mut config = Config::default();
        config.relays.platform_relays = vec!["wss://platform".to_string()];
        GroupManager::new(
            net.collaborators(),
            Arc::new(config),
            Arc::new(GroupKeyring::new()),
            Arc::new(AccessStateMachine::new()),
        )
    }

    fn metadata() -> GroupMetadata {
        GroupMetadata { name: "herald".to_string(), ..Default::default() }
    }

    #[tokio::test]
    async fn test_create_private_group() {
        let net = network();
        let groups = manager(&net);

        let created = groups
            .create_group(GroupVisibility::Private, metadata(), vec!["wss://group".to_string()])
            .await
            .unwrap();

        assert!(created.address.is_private());
        assert_eq!(groups.access().status(&net.user_pubkey(), &created.address).await, GroupAccessStatus::Granted);
        assert!(groups.keyring().shared_public_key(&created.address).await.is_some());
        assert_eq!(created.admin_shares.len(), 1);

        // Definition plus one admin share
        let published = net.publisher.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].event.kind, created.address.kind());
        assert_eq!(published[0].event.author_hex(), created.address.author);
        assert_eq!(published[0].event.tags.identifier(), Some(created.address.identifier.as_str()));
        assert_eq!(published[0].relays, vec!["wss://group", "wss://platform"]);
        assert_eq!(published[1].event.kind, KIND_GIFT_WRAP);
    }

    #[tokio::test]
    async fn test_admin_self_invite_skips_requested() {
        let net = network();
        let groups = manager(&net);
        let created = groups.create_group(GroupVisibility::Private, metadata(), vec![]).await.unwrap();

        let user = net.user_pubkey();
        groups.access().apply(&user, &created.address, AccessEvent::Exited).await.unwrap();

        let outcome = groups.request_access(&created.address, "").await.unwrap();
        assert_eq!(outcome.status, GroupAccessStatus::Granted);
        assert_eq!(outcome.outcomes.len(), 1);
    }

    #[tokio::test]
    async fn test_request_access_to_foreign_group() {
        let net = network();
        let groups = manager(&net);
        let foreign = init_group(GroupVisibility::Private, vec![]).unwrap().address;

        let outcome = groups.request_access(&foreign, "let me in").await.unwrap();
        assert_eq!(outcome.status, GroupAccessStatus::Requested);

        let sent = net.publisher.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event.tag_value("p"), Some(foreign.author.as_str()));
        assert!(sent[0].event.expiration().is_some());
    }

    #[tokio::test]
    async fn test_key_share_round_trip_between_admin_and_member() {
        // Admin side
        let admin_net = network();
        let admin = manager(&admin_net);
        let created = admin.create_group(GroupVisibility::Private, metadata(), vec![]).await.unwrap();

        // Member side
        let member_net = network();
        let member = manager(&member_net);
        let member_pk = member_net.user_pubkey();
        member.request_access(&created.address, "hi").await.unwrap();

        admin
            .publish_member_key_shares(&created.address, &[member_pk.clone()], Some(Duration::from_secs(60)))
            .await
            .unwrap();
        let invite = admin_net.publisher.published().last().unwrap().event.clone();

        let status = member.receive_envelope(&invite).await.unwrap();
        assert_eq!(status, GroupAccessStatus::Granted);
        assert_eq!(
            member.keyring().shared_public_key(&created.address).await,
            admin.keyring().shared_public_key(&created.address).await
        );

        // Eviction
        admin.publish_evictions(&created.address, &[member_pk.clone()]).await.unwrap();
        let eviction = admin_net.publisher.published().last().unwrap().event.clone();
        assert_eq!(member.receive_envelope(&eviction).await.unwrap(), GroupAccessStatus::Revoked);
        assert!(member.keyring().shared_public_key(&created.address).await.is_none());

        // Old invite redelivered
        assert_eq!(member.receive_envelope(&invite).await.unwrap(), GroupAccessStatus::Revoked);
    }

    #[tokio::test]
    async fn test_key_share_from_non_admin_rejected() {
        let net = network();
        let groups = manager(&net);
        let group = init_group(GroupVisibility::Public, vec![]).unwrap();

        let rumor = EventTemplate::new(KIND_GROUP_KEY_SHARE, "", vec![group.address.tag(), tag(TAG_ROLE, ["member"])])
            .into_unsigned(Keypair::generate().pubkey().unwrap());
        let result = groups.handle_key_share(&rumor).await;
        assert!(matches!(result, Err(GroupError::UnauthorizedKeyShare { .. })));
    }

    #[tokio::test]
    async fn test_shares_require_admin_key() {
        let net = network();
        let groups = manager(&net);
        let foreign = init_group(GroupVisibility::Public, vec![]).unwrap().address;

        let result = groups.publish_member_key_shares(&foreign, &[Keypair::generate().public_key.clone()], None).await;
        assert!(matches!(result, Err(GroupError::NotAdmin(_))));
        assert_eq!(net.publisher.count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_recipient_rejected_before_network() {
        let net = network();
        let groups = manager(&net);
        let created = groups.create_group(GroupVisibility::Public, metadata(), vec![]).await.unwrap();
        let before = net.publisher.count();

        let result = groups
            .publish_member_key_shares(&created.address, &[Keypair::generate().public_key.clone(), "bad".to_string()], None)
            .await;
        assert!(matches!(result, Err(GroupError::InvalidRecipient(_))));
        assert_eq!(net.publisher.count(), before);
    }

    #[tokio::test]
    async fn test_off_curve_recipient_rejected_before_network() {
        let net = network();
        let groups = manager(&net);
        let created = groups.create_group(GroupVisibility::Public, metadata(), vec![]).await.unwrap();
        let before = net.publisher.count();

        let result = groups.publish_member_key_shares(&created.address, &["f".repeat(64)], None).await;
        assert!(matches!(result, Err(GroupError::InvalidRecipient(_))));
        assert_eq!(net.publisher.count(), before);
    }

    #[tokio::test]
    async fn test_recipient_relays_do_not_fall_back() {
        let cd = Keypair::generate().public_key.clone();
        let ef = Keypair::generate().public_key.clone();
        let net = TestNetwork::new(
            MockSigner::new(),
            StaticRelaySelector::new()
                .with_inbox(&cd, &["wss://inbox-cd"])
                .with_fallback(&["wss://random"]),
        );
        let groups = manager(&net);
        let created = groups.create_group(GroupVisibility::Public, metadata(), vec!["wss://g".to_string()]).await.unwrap();

        groups
            .publish_member_key_shares(&created.address, &[cd.clone(), ef.clone()], None)
            .await
            .unwrap();

        let published = net.publisher.published();
        let by_recipient = |pk: &str| {
            published
                .iter()
                .find(|p| p.event.tag_value("p") == Some(pk))
                .map(|p| p.relays.clone())
                .unwrap()
        };
        assert_eq!(by_recipient(&cd), vec!["wss://inbox-cd", "wss://g", "wss://platform"]);
        assert_eq!(by_recipient(&ef), vec!["wss://g", "wss://platform"]);
    }
}
