/*
    receipts.rs - Read-receipt batching

    Ids marked seen stay local until `optimistic_threshold` of them are
    pending. Crossing the threshold turns every pending id into durable
    markers (kind 15, one `e` tag per id, `chunk_size` ids per marker,
    expiring after `expiration`) and clears the optimistic state.

    Markers are wrapped to the user's own key when the signer speaks the
    modern suite, and signed in the clear otherwise.
*/

use super::{PublishError, PublishResult};
use crate::config::Config;
use crate::core_event::{now, tag, Event, EventTemplate, Tag, Timestamp, KIND_SEEN};
use crate::core_wrap::{wrap_with_fallback, WrapOptions, WrapParams};
use crate::metrics::{record_counter, record_gauge};
use crate::traits::{
    merge_relays, publish_best_effort, Author, CipherCapability, Collaborators, PublishOutcome, PublishTarget,
};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Default)]
struct ReceiptState {
    /// Ids marked seen, with the time they were marked
    seen: HashMap<String, u64>,
    /// Seen ids not yet covered by a published marker, in marking order
    pending: Vec<String>,
}

impl ReceiptState {
    /// Put `ids` back at the front of the pending queue
    fn restore(&mut self, mut ids: Vec<String>) {
        ids.append(&mut self.pending);
        self.pending = ids;
        record_gauge("receipts.pending", self.pending.len() as f64);
    }
}

pub struct ReceiptTracker {
    collab: Collaborators,
    config: Arc<Config>,
    state: RwLock<ReceiptState>,
}

impl ReceiptTracker {
    pub fn new(collab: Collaborators, config: Arc<Config>) -> Self {
        Self { collab, config, state: RwLock::new(ReceiptState::default()) }
    }

    /// Mark `ids` as seen, publishing markers once enough are pending.
    ///
    /// Returns one outcome per published marker; empty while the batch is
    /// still optimistic. The batch leaves the pending queue as soon as it
    /// is taken, so concurrent callers never publish the same id twice.
    /// Ids whose marker could not be built, or that no relay accepted, go
    /// back to the queue.
    pub async fn mark_as_seen<I, S>(&self, ids: I) -> PublishResult<Vec<PublishOutcome>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let marked_at = now();
        let batch = {
            let mut state = self.state.write().await;
            self.forget_expired_locked(&mut state, marked_at);
            for id in ids {
                let id = id.into();
                if !state.seen.contains_key(&id) {
                    state.seen.insert(id.clone(), marked_at);
                    state.pending.push(id);
                }
            }
            record_gauge("receipts.pending", state.pending.len() as f64);

            if state.pending.len() < self.config.receipts.optimistic_threshold {
                debug!(pending = state.pending.len(), "Receipts kept optimistic");
                return Ok(Vec::new());
            }
            std::mem::take(&mut state.pending)
        };

        let built = self.build_markers(&batch).await;
        let markers = match built {
            Ok(markers) => markers,
            Err(e) => {
                self.state.write().await.restore(batch);
                return Err(e);
            }
        };

        let publisher = self.collab.publisher.as_ref();
        let outcomes = join_all(markers.iter().map(|(target, _)| publish_best_effort(publisher, target))).await;

        let unpublished: Vec<String> = markers
            .iter()
            .zip(&outcomes)
            .filter(|(_, outcome)| outcome.accepted_count() == 0)
            .flat_map(|((_, chunk), _)| chunk.iter().cloned())
            .collect();
        if !unpublished.is_empty() {
            warn!(ids = unpublished.len(), "Receipt markers not accepted by any relay, keeping ids pending");
            self.state.write().await.restore(unpublished);
        }

        record_counter("receipts.chunks.published", outcomes.len() as u64);
        info!(ids = batch.len(), markers = outcomes.len(), "Published read receipts");
        Ok(outcomes)
    }

    pub async fn is_seen(&self, id: &str) -> bool {
        self.state.read().await.seen.contains_key(id)
    }

    /// Ids waiting for the threshold
    pub async fn pending_count(&self) -> usize {
        self.state.read().await.pending.len()
    }

    /// Drop seen ids whose markers have expired on relays by `now`.
    ///
    /// Pending ids are kept regardless of age. Returns how many ids were
    /// forgotten.
    pub async fn forget_expired(&self, now: u64) -> usize {
        let mut state = self.state.write().await;
        self.forget_expired_locked(&mut state, now)
    }

    fn forget_expired_locked(&self, state: &mut ReceiptState, now: u64) -> usize {
        let ttl = self.config.receipts.expiration.as_secs();
        let ReceiptState { seen, pending } = state;
        let pending: HashSet<&String> = pending.iter().collect();

        let before = seen.len();
        seen.retain(|id, marked_at| marked_at.saturating_add(ttl) > now || pending.contains(id));
        let forgotten = before - seen.len();
        if forgotten > 0 {
            debug!(forgotten, "Forgot expired receipts");
        }
        forgotten
    }

    /// One marker per chunk, each paired with the ids it covers
    async fn build_markers<'a>(&self, ids: &'a [String]) -> PublishResult<Vec<(PublishTarget, &'a [String])>> {
        let signer = self.collab.signer.as_ref();
        if !signer.is_enabled() {
            return Err(PublishError::SignerUnavailable);
        }
        let user = signer.user_pubkey().ok_or(PublishError::SignerUnavailable)?;

        let expiration = now() + self.config.receipts.expiration.as_secs();
        let private = signer.capability() == CipherCapability::Modern;
        let chunk_size = self.config.receipts.chunk_size.max(1);

        let mut markers = Vec::new();
        for chunk in ids.chunks(chunk_size) {
            let mut tags: Vec<Tag> = chunk.iter().map(|id| tag("e", [id.as_str()])).collect();
            tags.push(Tag::expiration(Timestamp::from(expiration)));
            let template = EventTemplate::new(KIND_SEEN, "", tags);

            let (event, relays) = if private {
                let event = self.wrap_to_self(template, &user, expiration).await?;
                (event, self.collab.relays.inbox_relays(&[user.clone()], true))
            } else {
                (self.sign_clear(template).await?, self.collab.relays.user_write_relays())
            };
            let relays = merge_relays(vec![relays], self.config.relays.max_relays_per_target);
            markers.push((PublishTarget { event, relays }, chunk));
        }
        Ok(markers)
    }

    async fn wrap_to_self(&self, template: EventTemplate, user: &str, expiration: u64) -> PublishResult<Event> {
        let options = WrapOptions { author: Author::User, wrap: WrapParams::to(user).with_expiration(expiration) };
        let envelope = wrap_with_fallback(self.collab.signer.as_ref(), template, &options).await?;
        Ok(envelope.event)
    }

    async fn sign_clear(&self, template: EventTemplate) -> PublishResult<Event> {
        let event = self.collab.signer.sign_as_user(template).await?;
        record_counter("publish.events.signed", 1);
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_event::{EventExt, KIND_GIFT_WRAP};
    use crate::core_wrap::unwrap;
    use crate::test_utils::{MockSigner, StaticRelaySelector, TestNetwork};

    fn setup(signer: MockSigner) -> (TestNetwork, ReceiptTracker) {
        let user = signer.user().public_key.clone();
        let net = TestNetwork::new(
            signer,
            StaticRelaySelector::new().with_write(&["wss://write"]).with_inbox(&user, &["wss://inbox"]),
        );
        let tracker = ReceiptTracker::new(net.collaborators(), Arc::new(Config::default()));
        (net, tracker)
    }

    fn ids(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("{:064x}", i)).collect()
    }

    #[tokio::test]
    async fn test_below_threshold_stays_local() {
        let (net, tracker) = setup(MockSigner::new());

        let outcomes = tracker.mark_as_seen(ids(0..50)).await.unwrap();

        assert!(outcomes.is_empty());
        assert_eq!(net.signer.signed_count(), 0);
        assert_eq!(net.publisher.count(), 0);
        assert!(tracker.is_seen(&ids(0..1)[0]).await);
        assert_eq!(tracker.pending_count().await, 50);
    }

    #[tokio::test]
    async fn test_crossing_threshold_publishes_one_wrapped_chunk() {
        let (net, tracker) = setup(MockSigner::new());

        let outcomes = tracker.mark_as_seen(ids(0..150)).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(tracker.pending_count().await, 0);

        let published = net.publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].relays, vec!["wss://inbox"]);

        let envelope = &published[0].event;
        assert_eq!(envelope.kind, KIND_GIFT_WRAP);
        let expected = now() + 90 * 24 * 60 * 60;
        let expiration = envelope.expiration().unwrap();
        assert!(expiration <= expected && expiration + 5 >= expected);

        let rumor = unwrap(net.signer.as_ref(), &Author::User, envelope).await.unwrap();
        assert_eq!(rumor.kind, KIND_SEEN);
        assert_eq!(rumor.tag_values("e").len(), 150);
    }

    #[tokio::test]
    async fn test_legacy_signer_publishes_in_clear() {
        let (net, tracker) = setup(MockSigner::with_capability(CipherCapability::Legacy));

        tracker.mark_as_seen(ids(0..100)).await.unwrap();

        let published = net.publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event.kind, KIND_SEEN);
        assert_eq!(published[0].event.author_hex(), net.user_pubkey());
        assert_eq!(published[0].relays, vec!["wss://write"]);
        assert!(published[0].event.expiration().is_some());
    }

    #[tokio::test]
    async fn test_large_batch_is_chunked() {
        let (net, tracker) = setup(MockSigner::new());

        let outcomes = tracker.mark_as_seen(ids(0..1200)).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(net.publisher.count(), 3);
    }

    #[tokio::test]
    async fn test_threshold_clears_optimistic_state() {
        let (net, tracker) = setup(MockSigner::new());

        tracker.mark_as_seen(ids(0..60)).await.unwrap();
        tracker.mark_as_seen(ids(60..120)).await.unwrap();
        assert_eq!(net.publisher.count(), 1);

        // Re-marking already covered ids does not refill the batch
        tracker.mark_as_seen(ids(0..120)).await.unwrap();
        assert_eq!(tracker.pending_count().await, 0);
        assert_eq!(net.publisher.count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_signer_keeps_pending() {
        let (net, tracker) = setup(MockSigner::new());
        net.signer.set_enabled(false);

        let result = tracker.mark_as_seen(ids(0..150)).await;
        assert!(matches!(result, Err(PublishError::SignerUnavailable)));
        assert_eq!(tracker.pending_count().await, 150);
        assert_eq!(net.publisher.count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_marks_publish_each_id_once() {
        let (net, tracker) = setup(MockSigner::with_capability(CipherCapability::Legacy).yielding());

        let (first, second) = tokio::join!(tracker.mark_as_seen(ids(0..150)), tracker.mark_as_seen(ids(150..151)));
        first.unwrap();
        second.unwrap();

        let marked: Vec<String> = net
            .publisher
            .published()
            .iter()
            .flat_map(|p| p.event.tag_values("e").into_iter().map(String::from).collect::<Vec<_>>())
            .collect();
        let unique: HashSet<&String> = marked.iter().collect();
        assert_eq!(unique.len(), marked.len());
        assert_eq!(marked.len() + tracker.pending_count().await, 151);
        assert_eq!(marked.len(), 150);
    }

    #[tokio::test]
    async fn test_rejected_markers_return_to_pending() {
        let (net, tracker) = setup(MockSigner::with_capability(CipherCapability::Legacy));
        net.publisher.fail_all(true);

        let outcomes = tracker.mark_as_seen(ids(0..150)).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].accepted_count(), 0);
        assert_eq!(tracker.pending_count().await, 150);

        // The next mark retries the whole backlog
        net.publisher.fail_all(false);
        let outcomes = tracker.mark_as_seen(ids(150..151)).await.unwrap();
        assert_eq!(outcomes[0].accepted_count(), 1);
        assert_eq!(tracker.pending_count().await, 0);
        assert_eq!(net.publisher.published()[0].event.tag_values("e").len(), 151);
    }

    #[tokio::test]
    async fn test_expired_receipts_are_forgotten() {
        let (_net, tracker) = setup(MockSigner::new());
        tracker.mark_as_seen(ids(0..150)).await.unwrap();
        tracker.mark_as_seen(ids(150..160)).await.unwrap();

        let later = now() + 91 * 24 * 60 * 60;
        assert_eq!(tracker.forget_expired(later).await, 150);
        assert!(!tracker.is_seen(&ids(0..1)[0]).await);
        // Still pending, so still remembered
        assert!(tracker.is_seen(&ids(150..151)[0]).await);
        assert_eq!(tracker.pending_count().await, 10);
    }
}
