//! Destination-scoped publishing
//!
//! Every branch validates all of its addresses before the first signer or
//! relay call, so a rejected branch leaves nothing half-sent.

use super::{PublishError, PublishResult};
use crate::config::Config;
use crate::core_event::{Event, EventTemplate};
use crate::core_group::{AccessStateMachine, GroupAddress, GroupKeyring, GroupVisibility, SharedKey};
use crate::core_identity::Keypair;
use crate::core_wrap::{wrap_with_fallback, WrapOptions, WrapParams};
use crate::metrics::{record_counter, Timer};
use crate::traits::{merge_relays, publish_best_effort, Author, Collaborators, PublishOutcome, PublishTarget};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-call publishing options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Sign with a throwaway key instead of the user's
    pub anonymous: bool,
}

/// A branch of a mixed publish that was refused
#[derive(Debug, Clone)]
pub struct BranchRejection {
    pub visibility: GroupVisibility,
    pub addresses: Vec<GroupAddress>,
    pub error: PublishError,
}

/// Combined result of every branch of one publish call
#[derive(Debug, Clone, Default)]
pub struct GroupPublishResult {
    /// Events handed to the publisher (envelopes for private branches)
    pub events: Vec<Event>,
    pub outcomes: Vec<PublishOutcome>,
    pub rejections: Vec<BranchRejection>,
}

impl GroupPublishResult {
    fn absorb(&mut self, other: GroupPublishResult) {
        self.events.extend(other.events);
        self.outcomes.extend(other.outcomes);
        self.rejections.extend(other.rejections);
    }

    fn push(&mut self, target: PublishTarget, outcome: PublishOutcome) {
        self.events.push(target.event);
        self.outcomes.push(outcome);
    }

    /// Relays that accepted at least one event
    pub fn accepted_count(&self) -> usize {
        self.outcomes.iter().map(PublishOutcome::accepted_count).sum()
    }
}

pub struct PublishOrchestrator {
    collab: Collaborators,
    config: Arc<Config>,
    keyring: Arc<GroupKeyring>,
    access: Arc<AccessStateMachine>,
}

impl PublishOrchestrator {
    pub fn new(
        collab: Collaborators,
        config: Arc<Config>,
        keyring: Arc<GroupKeyring>,
        access: Arc<AccessStateMachine>,
    ) -> Self {
        Self { collab, config, keyring, access }
    }

    /// General entry point.
    ///
    /// No addresses means a plain broadcast to the user's write relays.
    /// Otherwise addresses are split by visibility and each branch runs on
    /// its own; a refused branch is recorded in `rejections`.
    pub async fn publish_to_zero_or_more_groups(
        &self,
        addresses: &[GroupAddress],
        template: EventTemplate,
        options: PublishOptions,
    ) -> PublishResult<GroupPublishResult> {
        let timer = Timer::new("publish.duration_ms");

        if addresses.is_empty() {
            let result = self.broadcast(template, options).await;
            timer.stop();
            return result;
        }

        let (private, public): (Vec<GroupAddress>, Vec<GroupAddress>) =
            addresses.iter().cloned().partition(GroupAddress::is_private);

        let mut result = GroupPublishResult::default();
        for (visibility, branch) in [(GroupVisibility::Public, public), (GroupVisibility::Private, private)] {
            if branch.is_empty() {
                continue;
            }

            let outcome = match visibility {
                GroupVisibility::Public => self.publish_to_groups_publicly(&branch, template.clone(), options).await,
                GroupVisibility::Private => self.publish_to_groups_privately(&branch, template.clone(), options).await,
            };
            match outcome {
                Ok(branch_result) => result.absorb(branch_result),
                Err(error) => {
                    warn!(?visibility, groups = branch.len(), error = %error, "Publish branch rejected");
                    record_counter("publish.branches.rejected", 1);
                    result.rejections.push(BranchRejection { visibility, addresses: branch, error });
                }
            }
        }

        timer.stop();
        Ok(result)
    }

    /// One signed event tagged with every address, sent to the union of
    /// the groups' relays
    pub async fn publish_to_groups_publicly(
        &self,
        addresses: &[GroupAddress],
        template: EventTemplate,
        options: PublishOptions,
    ) -> PublishResult<GroupPublishResult> {
        if addresses.is_empty() {
            return Err(PublishError::InvalidAddress("no group address given".to_string()));
        }
        if let Some(private) = addresses.iter().find(|a| a.is_private()) {
            return Err(PublishError::InvalidAddress(format!("{} is not a public group", private)));
        }

        let author = self.author(options)?;
        let template = template.with_tags(addresses.iter().map(GroupAddress::tag));
        let event = self.sign(&author, template).await?;

        let relays = merge_relays(
            addresses.iter().map(|a| self.collab.relays.group_relays(a)),
            self.config.relays.max_relays_per_target,
        );
        let target = PublishTarget { event, relays };
        let outcome = publish_best_effort(self.collab.publisher.as_ref(), &target).await;

        info!(groups = addresses.len(), event_id = %target.event.id, "Published to public groups");
        let mut result = GroupPublishResult::default();
        result.push(target, outcome);
        Ok(result)
    }

    /// One envelope per group, addressed to and outer-signed by the group's
    /// shared key, so only members can open it
    pub async fn publish_to_groups_privately(
        &self,
        addresses: &[GroupAddress],
        template: EventTemplate,
        options: PublishOptions,
    ) -> PublishResult<GroupPublishResult> {
        if addresses.is_empty() {
            return Err(PublishError::InvalidAddress("no group address given".to_string()));
        }

        let user = self.collab.signer.user_pubkey().ok_or(PublishError::SignerUnavailable)?;
        let mut keys: Vec<(GroupAddress, SharedKey)> = Vec::with_capacity(addresses.len());
        for address in addresses {
            if !address.is_private() {
                return Err(PublishError::InvalidAddress(format!("{} is not a private group", address)));
            }
            if !self.access.status(&user, address).await.is_granted() {
                return Err(PublishError::NotAMember(address.to_string()));
            }
            let shared = self
                .keyring
                .shared_key(address)
                .await
                .ok_or_else(|| PublishError::MissingKey(address.to_string()))?;
            keys.push((address.clone(), shared));
        }

        let author = self.author(options)?;

        // Wrap everything before dispatching anything
        let mut targets = Vec::with_capacity(keys.len());
        for (address, shared) in keys {
            let wrap_options = WrapOptions {
                author: author.clone(),
                wrap: WrapParams::to(shared.keypair.public_key.clone()).with_author(shared.keypair),
            };
            let rumor = template.clone().with_tag(address.tag());
            let envelope = wrap_with_fallback(self.collab.signer.as_ref(), rumor, &wrap_options).await?;
            let relays = merge_relays(
                vec![self.collab.relays.group_relays(&address)],
                self.config.relays.max_relays_per_target,
            );
            targets.push(PublishTarget { event: envelope.event, relays });
        }

        let publisher = self.collab.publisher.as_ref();
        let outcomes = join_all(targets.iter().map(|t| publish_best_effort(publisher, t))).await;

        debug!(groups = targets.len(), "Published to private groups");
        let mut result = GroupPublishResult::default();
        for (target, outcome) in targets.into_iter().zip(outcomes) {
            result.push(target, outcome);
        }
        Ok(result)
    }

    /// Publish in the clear as the group itself, signed with its admin key
    pub async fn publish_as_group_admin_publicly(
        &self,
        address: &GroupAddress,
        template: EventTemplate,
    ) -> PublishResult<GroupPublishResult> {
        let admin = self
            .keyring
            .admin_key(address)
            .await
            .ok_or_else(|| PublishError::MissingKey(address.to_string()))?;

        let author = Author::Key(admin.keypair);
        let event = self.sign(&author, template.with_tag(address.tag())).await?;

        let relays = merge_relays(
            vec![
                self.collab.relays.group_relays(address),
                admin.relays,
                self.config.relays.platform_relays.clone(),
            ],
            self.config.relays.max_relays_per_target,
        );
        let target = PublishTarget { event, relays };
        let outcome = publish_best_effort(self.collab.publisher.as_ref(), &target).await;

        let mut result = GroupPublishResult::default();
        result.push(target, outcome);
        Ok(result)
    }

    async fn broadcast(&self, template: EventTemplate, options: PublishOptions) -> PublishResult<GroupPublishResult> {
        let author = self.author(options)?;
        let event = self.sign(&author, template).await?;

        let relays = merge_relays(
            vec![self.collab.relays.user_write_relays()],
            self.config.relays.max_relays_per_target,
        );
        let target = PublishTarget { event, relays };
        let outcome = publish_best_effort(self.collab.publisher.as_ref(), &target).await;

        let mut result = GroupPublishResult::default();
        result.push(target, outcome);
        Ok(result)
    }

    fn author(&self, options: PublishOptions) -> PublishResult<Author> {
        if options.anonymous {
            return Ok(Author::Key(Keypair::generate()));
        }
        if !self.collab.signer.is_enabled() {
            return Err(PublishError::SignerUnavailable);
        }
        Ok(Author::User)
    }

    async fn sign(&self, author: &Author, template: EventTemplate) -> PublishResult<Event> {
        let event = self.collab.signer.sign_as(author, template).await?;
        record_counter("publish.events.signed", 1);
        Ok(event)
    }
}
