//! Batch loading over the freshness store

use super::{LoadError, LoadOptions, LoadResult, LoadSummary};
use crate::config::Config;
use crate::core_event::{dedup_key, now, Event, Filter, Kind, PublicKey, KIND_PROFILE, KIND_RELAY_LIST};
use crate::core_group::GroupAddress;
use crate::core_store::{FreshnessStore, ProfileIndex, NAMESPACE_GROUPS, NAMESPACE_PROFILE, NAMESPACE_RELAYS};
use crate::metrics::record_counter;
use crate::traits::{Collaborators, LoadRequest, TransportError};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of one relay fetch
struct RelayFetch {
    relay: String,
    result: Result<(), TransportError>,
    events: Vec<Event>,
}

pub struct FreshnessLoader {
    collab: Collaborators,
    config: Arc<Config>,
    freshness: Arc<FreshnessStore>,
    profiles: Arc<ProfileIndex>,
}

impl FreshnessLoader {
    pub fn new(
        collab: Collaborators,
        config: Arc<Config>,
        freshness: Arc<FreshnessStore>,
        profiles: Arc<ProfileIndex>,
    ) -> Self {
        Self { collab, config, freshness, profiles }
    }

    pub fn freshness(&self) -> &Arc<FreshnessStore> {
        &self.freshness
    }

    /// Fetch `kinds` authored by the stale subset of `identities`.
    ///
    /// Resolves without touching the network when nothing is stale. Each
    /// relay is asked only for the identities it serves; a relay that fails
    /// is reported in the summary and skipped. Identities no relay serves
    /// go to the platform relays, or are left out of the batch with their
    /// backoff untouched when there are none.
    pub async fn load_batch(
        &self,
        namespace: &str,
        kinds: &[Kind],
        identities: &[String],
        options: LoadOptions,
    ) -> LoadResult<LoadSummary> {
        if namespace.is_empty() {
            return Err(LoadError::EmptyNamespace);
        }
        if kinds.is_empty() {
            return Err(LoadError::NoKinds);
        }

        let delta = options.base_delta.unwrap_or_else(|| self.base_delta(namespace));
        let stale = self
            .freshness
            .select_stale(identities, namespace, delta.as_secs(), now(), options.force)
            .await;
        record_counter("loader.identities.stale", stale.len() as u64);

        if stale.is_empty() {
            debug!(namespace, candidates = identities.len(), "Nothing stale");
            return Ok(LoadSummary::default());
        }

        let (partitions, keys, unroutable) = self.route(&stale, &options);
        if !unroutable.is_empty() {
            warn!(namespace, identities = unroutable.len(), "No relay serves these identities, skipping");
            record_counter("loader.identities.unroutable", unroutable.len() as u64);
            self.freshness.release(&unroutable).await;
        }
        let requested: Vec<String> = stale.into_iter().filter(|id| !unroutable.contains(id)).collect();
        if requested.is_empty() {
            return Ok(LoadSummary::default());
        }

        let fetches = partitions.into_iter().map(|(relay, authors)| {
            let authors: Vec<PublicKey> = authors.iter().filter_map(|a| keys.get(a).copied()).collect();
            let filters = build_filters(kinds, &authors);
            self.fetch(namespace, relay, filters, options.skip_cache)
        });
        let results = join_all(fetches).await;

        let mut newest: HashMap<String, Event> = HashMap::new();
        let mut failed_relays = Vec::new();
        let mut received = 0usize;

        for fetch in results {
            if let Err(e) = &fetch.result {
                warn!(namespace, relay = %fetch.relay, error = %e, "Relay fetch failed");
                record_counter("loader.relays.failed", 1);
                failed_relays.push(fetch.relay);
            }
            received += fetch.events.len();
            for event in fetch.events {
                let key = dedup_key(&event);
                match newest.get(&key) {
                    Some(current) if current.created_at >= event.created_at => {}
                    _ => {
                        newest.insert(key, event);
                    }
                }
            }
        }
        record_counter("loader.events.received", received as u64);

        let mut events: Vec<Event> = newest.into_values().collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        info!(
            namespace,
            requested = requested.len(),
            events = events.len(),
            failed = failed_relays.len(),
            "Batch load settled"
        );

        Ok(LoadSummary { requested, events, failed_relays })
    }

    /// Load profiles and merge them into the profile index.
    ///
    /// Events older than the repository's copy are dropped.
    pub async fn load_profiles(&self, pubkeys: &[String], options: LoadOptions) -> LoadResult<LoadSummary> {
        let mut summary = self.load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], pubkeys, options).await?;
        summary.events = self.store_newer(summary.events);

        for event in &summary.events {
            self.profiles.apply_event(event).await;
        }
        Ok(summary)
    }

    /// Load relay lists into the repository
    pub async fn load_relay_lists(&self, pubkeys: &[String], options: LoadOptions) -> LoadResult<LoadSummary> {
        let mut summary = self.load_batch(NAMESPACE_RELAYS, &[KIND_RELAY_LIST], pubkeys, options).await?;
        summary.events = self.store_newer(summary.events);
        Ok(summary)
    }

    /// Load group definitions for `addresses`.
    ///
    /// Freshness is tracked per group author; definitions of groups that
    /// were not asked for are dropped.
    pub async fn load_group_meta(&self, addresses: &[GroupAddress], options: LoadOptions) -> LoadResult<LoadSummary> {
        let kinds: Vec<Kind> = addresses.iter().map(GroupAddress::kind).collect::<BTreeSet<_>>().into_iter().collect();
        if kinds.is_empty() {
            return Ok(LoadSummary::default());
        }
        let authors: Vec<String> = addresses.iter().map(|a| a.author.clone()).collect();

        let mut summary = self.load_batch(NAMESPACE_GROUPS, &kinds, &authors, options).await?;
        summary.events.retain(|event| {
            let author = event.pubkey.to_hex();
            addresses.iter().any(|a| {
                a.kind() == event.kind
                    && a.author == author
                    && event.tags.identifier() == Some(a.identifier.as_str())
            })
        });
        summary.events = self.store_newer(summary.events);
        Ok(summary)
    }

    /// Split `stale` into per-relay author lists.
    ///
    /// Returns the partitions, the parsed key of every routable identity,
    /// and the identities that could not be routed anywhere.
    fn route(
        &self,
        stale: &[String],
        options: &LoadOptions,
    ) -> (Vec<(String, Vec<String>)>, HashMap<String, PublicKey>, Vec<String>) {
        let mut keys = HashMap::with_capacity(stale.len());
        let mut unroutable = Vec::new();
        for identity in stale {
            match PublicKey::from_hex(identity) {
                Ok(key) => {
                    keys.insert(identity.clone(), key);
                }
                Err(_) => unroutable.push(identity.clone()),
            }
        }
        let routable: Vec<String> = stale.iter().filter(|id| keys.contains_key(*id)).cloned().collect();

        let mut partitions: Vec<(String, Vec<String>)> = match &options.relays {
            Some(relays) => relays.iter().map(|relay| (relay.clone(), routable.clone())).collect(),
            None => self.collab.relays.partition_by_outbox(&routable),
        };

        let orphans: Vec<String> = {
            let routed: HashSet<&String> = partitions.iter().flat_map(|(_, authors)| authors).collect();
            routable.iter().filter(|id| !routed.contains(id)).cloned().collect()
        };
        if !orphans.is_empty() {
            let platform = &self.config.relays.platform_relays;
            if platform.is_empty() {
                unroutable.extend(orphans);
            } else {
                debug!(identities = orphans.len(), "Routing to platform relays");
                for relay in platform {
                    match partitions.iter_mut().find(|(r, _)| r == relay) {
                        Some((_, authors)) => authors.extend(orphans.iter().cloned()),
                        None => partitions.push((relay.clone(), orphans.clone())),
                    }
                }
            }
        }

        (partitions, keys, unroutable)
    }

    /// Keep events newer than the repository's latest copy and store them
    fn store_newer(&self, events: Vec<Event>) -> Vec<Event> {
        let repository = &self.collab.repository;
        events
            .into_iter()
            .filter(|event| {
                let known = if event.kind.is_addressable() {
                    let filter = Filter::new()
                        .kind(event.kind)
                        .author(event.pubkey)
                        .identifier(event.tags.identifier().unwrap_or_default());
                    repository.query(&filter).into_iter().map(|e| e.created_at).max()
                } else {
                    repository.latest(event.kind, &event.pubkey.to_hex()).map(|e| e.created_at)
                };
                match known {
                    Some(known) if known >= event.created_at => {
                        debug!(event_id = %event.id, "Repository already has a newer copy");
                        false
                    }
                    _ => {
                        repository.insert(event.clone());
                        true
                    }
                }
            })
            .collect()
    }

    fn base_delta(&self, namespace: &str) -> Duration {
        let loader = &self.config.loader;
        match namespace {
            NAMESPACE_RELAYS => loader.relay_list_delta,
            NAMESPACE_GROUPS => loader.group_delta,
            _ => loader.profile_delta,
        }
    }

    /// One request against one relay. Freshness is updated as events
    /// stream in, not after the request settles.
    async fn fetch(&self, namespace: &str, relay: String, filters: Vec<Filter>, skip_cache: bool) -> RelayFetch {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = LoadRequest { filters, relays: vec![relay.clone()], skip_cache };

        let load = self.collab.loader.load(request, tx);
        let drain = async {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                self.freshness.touch(namespace, &event.pubkey.to_hex(), now()).await;
                events.push(event);
            }
            events
        };

        let (result, events) = tokio::join!(load, drain);
        RelayFetch { relay, result, events }
    }
}

/// Plain kinds share one filter; each addressable kind gets its own so
/// results for one identifier never shadow another's
fn build_filters(kinds: &[Kind], authors: &[PublicKey]) -> Vec<Filter> {
    let (addressable, plain): (Vec<Kind>, Vec<Kind>) = kinds.iter().copied().partition(|k| k.is_addressable());

    let mut filters = Vec::with_capacity(1 + addressable.len());
    if !plain.is_empty() {
        filters.push(Filter::new().kinds(plain).authors(authors.iter().copied()));
    }
    for kind in addressable {
        filters.push(Filter::new().kind(kind).authors(authors.iter().copied()));
    }
    filters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_event::{EventExt, Tag, KIND_PRIVATE_GROUP, KIND_PUBLIC_GROUP};
    use crate::core_group::GroupVisibility;
    use crate::core_identity::Keypair;
    use crate::test_utils::{test_event, MockSigner, StaticRelaySelector, TestNetwork};
    use crate::traits::Repository;
    use serde_json::json;

    fn setup(relays: StaticRelaySelector) -> (TestNetwork, FreshnessLoader) {
        setup_with(relays, Config::default())
    }

    fn setup_with(relays: StaticRelaySelector, config: Config) -> (TestNetwork, FreshnessLoader) {
        let net = TestNetwork::new(MockSigner::new(), relays);
        let loader = FreshnessLoader::new(
            net.collaborators(),
            Arc::new(config),
            Arc::new(FreshnessStore::default()),
            Arc::new(ProfileIndex::new()),
        );
        (net, loader)
    }

    fn profile(author: &Keypair, created_at: u64, name: &str) -> Event {
        test_event(KIND_PROFILE, author, created_at, vec![], &json!({ "name": name }).to_string())
    }

    fn authors(keys: &[&Keypair]) -> Option<BTreeSet<PublicKey>> {
        Some(keys.iter().map(|k| k.pubkey().unwrap()).collect())
    }

    #[test]
    fn test_filters_separate_addressable_kinds() {
        let a = Keypair::generate();
        let filters = build_filters(
            &[KIND_PROFILE, KIND_PUBLIC_GROUP, KIND_RELAY_LIST, KIND_PRIVATE_GROUP],
            &[a.pubkey().unwrap()],
        );

        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].kinds, Some(BTreeSet::from([KIND_PROFILE, KIND_RELAY_LIST])));
        assert_eq!(filters[1].kinds, Some(BTreeSet::from([KIND_PUBLIC_GROUP])));
        assert_eq!(filters[2].kinds, Some(BTreeSet::from([KIND_PRIVATE_GROUP])));
        assert!(filters.iter().all(|f| f.authors == authors(&[&a])));
    }

    #[tokio::test]
    async fn test_fresh_identities_cause_no_network() {
        let a = Keypair::generate();
        let (net, loader) = setup(StaticRelaySelector::new().with_fallback(&["wss://r"]));
        net.loader.add_event("wss://r", profile(&a, 10, "a"));
        let ids = [a.public_key.clone()];

        let first = loader.load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], &ids, LoadOptions::default()).await.unwrap();
        assert!(first.fetched());

        let second = loader.load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], &ids, LoadOptions::default()).await.unwrap();
        assert!(!second.fetched());
        assert_eq!(net.loader.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_identities_never_requested() {
        let (net, loader) = setup(StaticRelaySelector::new().with_fallback(&["wss://r"]));

        let summary = loader
            .load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], &["npub1xyz".to_string(), "A".repeat(64)], LoadOptions::forced())
            .await
            .unwrap();

        assert!(!summary.fetched());
        assert!(net.loader.requests().is_empty());
    }

    #[tokio::test]
    async fn test_off_curve_identity_is_released() {
        let (net, loader) = setup(StaticRelaySelector::new().with_fallback(&["wss://r"]));
        let bogus = "f".repeat(64);

        let summary = loader
            .load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], &[bogus.clone()], LoadOptions::default())
            .await
            .unwrap();

        assert!(!summary.fetched());
        assert!(net.loader.requests().is_empty());
        assert_eq!(loader.freshness().attempts(&bogus).await, 0);
    }

    #[tokio::test]
    async fn test_each_relay_gets_its_own_identities() {
        let (a, b, c) = (Keypair::generate(), Keypair::generate(), Keypair::generate());
        let (net, loader) = setup(
            StaticRelaySelector::new()
                .with_outbox(&a.public_key, &["wss://one"])
                .with_outbox(&b.public_key, &["wss://two"])
                .with_outbox(&c.public_key, &["wss://one"]),
        );
        let ids = [a.public_key.clone(), b.public_key.clone(), c.public_key.clone()];

        loader.load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], &ids, LoadOptions::default()).await.unwrap();

        let mut requests = net.loader.requests();
        requests.sort_by(|x, y| x.relays.cmp(&y.relays));
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].relays, vec!["wss://one"]);
        assert_eq!(requests[0].filters[0].authors, authors(&[&a, &c]));
        assert_eq!(requests[1].relays, vec!["wss://two"]);
        assert_eq!(requests[1].filters[0].authors, authors(&[&b]));
    }

    #[tokio::test]
    async fn test_unserved_identity_is_not_requested() {
        let (a, b) = (Keypair::generate(), Keypair::generate());
        let (net, loader) = setup(StaticRelaySelector::new().with_outbox(&a.public_key, &["wss://one"]));

        let summary = loader
            .load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], &[a.public_key.clone(), b.public_key.clone()], LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.requested, vec![a.public_key.clone()]);
        assert_eq!(loader.freshness().attempts(&b.public_key).await, 0);
        let requests = net.loader.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].filters[0].authors, authors(&[&a]));
    }

    #[tokio::test]
    async fn test_unserved_identity_goes_to_platform_relays() {
        let (a, b) = (Keypair::generate(), Keypair::generate());
        let mut config = Config::default();
        config.relays.platform_relays = vec!["wss://platform".to_string(), "wss://one".to_string()];
        let (net, loader) = setup_with(StaticRelaySelector::new().with_outbox(&a.public_key, &["wss://one"]), config);
        net.loader.add_event("wss://platform", profile(&b, 10, "b"));

        let summary = loader
            .load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], &[a.public_key.clone(), b.public_key.clone()], LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.requested.len(), 2);
        assert_eq!(summary.events.len(), 1);
        let mut requests = net.loader.requests();
        requests.sort_by(|x, y| x.relays.cmp(&y.relays));
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].relays, vec!["wss://one"]);
        assert_eq!(requests[0].filters[0].authors, authors(&[&a, &b]));
        assert_eq!(requests[1].relays, vec!["wss://platform"]);
        assert_eq!(requests[1].filters[0].authors, authors(&[&b]));
    }

    #[tokio::test]
    async fn test_overlapping_batches_settle_consistently() {
        let (a, b, c) = (Keypair::generate(), Keypair::generate(), Keypair::generate());
        let (net, loader) = setup(StaticRelaySelector::new().with_fallback(&["wss://r"]));
        for key in [&a, &b, &c] {
            net.loader.add_event("wss://r", profile(key, 10, "x"));
        }

        let first_ids = [a.public_key.clone(), b.public_key.clone()];
        let second_ids = [b.public_key.clone(), c.public_key.clone()];
        let (first, second) = tokio::join!(
            loader.load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], &first_ids, LoadOptions::default()),
            loader.load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], &second_ids, LoadOptions::default()),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        let requested: HashSet<&String> = first.requested.iter().chain(&second.requested).collect();
        assert_eq!(requested.len(), 3);
        for key in [&a, &b, &c] {
            assert!(loader.freshness().get(NAMESPACE_PROFILE, &key.public_key).await.is_some());
            assert_eq!(loader.freshness().attempts(&key.public_key).await, 0);
        }
        for summary in [&first, &second] {
            assert!(summary.events.iter().all(|e| summary.requested.contains(&e.author_hex())));
        }
    }

    #[tokio::test]
    async fn test_newest_version_wins_across_relays() {
        let a = Keypair::generate();
        let (net, loader) = setup(StaticRelaySelector::new().with_outbox(&a.public_key, &["wss://one", "wss://two"]));
        net.loader.add_event("wss://one", profile(&a, 100, "old"));
        net.loader.add_event("wss://two", profile(&a, 200, "new"));

        let summary = loader.load_profiles(&[a.public_key.clone()], LoadOptions::default()).await.unwrap();

        assert_eq!(summary.events.len(), 1);
        assert_eq!(summary.events[0].created_at.as_u64(), 200);
        assert_eq!(loader.profiles.get_json(&a.public_key).await, Some(json!({ "name": "new" })));
    }

    #[tokio::test]
    async fn test_received_events_refresh_and_missing_ones_back_off() {
        let (a, b) = (Keypair::generate(), Keypair::generate());
        let (net, loader) = setup(StaticRelaySelector::new().with_fallback(&["wss://r"]));
        net.loader.add_event("wss://r", profile(&a, 10, "a"));

        loader
            .load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], &[a.public_key.clone(), b.public_key.clone()], LoadOptions::default())
            .await
            .unwrap();

        let freshness = loader.freshness();
        assert!(freshness.get(NAMESPACE_PROFILE, &a.public_key).await.is_some());
        assert_eq!(freshness.attempts(&a.public_key).await, 0);
        assert!(freshness.get(NAMESPACE_PROFILE, &b.public_key).await.is_none());
        assert_eq!(freshness.attempts(&b.public_key).await, 1);
    }

    #[tokio::test]
    async fn test_failed_relay_is_skipped() {
        let (a, b) = (Keypair::generate(), Keypair::generate());
        let (net, loader) = setup(
            StaticRelaySelector::new()
                .with_outbox(&a.public_key, &["wss://up"])
                .with_outbox(&b.public_key, &["wss://down"]),
        );
        net.loader.add_event("wss://up", profile(&a, 10, "a"));
        net.loader.fail_relay("wss://down");

        let summary = loader
            .load_batch(NAMESPACE_PROFILE, &[KIND_PROFILE], &[a.public_key.clone(), b.public_key.clone()], LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.events.len(), 1);
        assert_eq!(summary.failed_relays, vec!["wss://down"]);
    }

    #[tokio::test]
    async fn test_explicit_relays_override_outbox() {
        let a = Keypair::generate();
        let (net, loader) = setup(StaticRelaySelector::new().with_outbox(&a.public_key, &["wss://outbox"]));

        loader
            .load_relay_lists(&[a.public_key.clone()], LoadOptions::default().with_relays(vec!["wss://explicit".to_string()]))
            .await
            .unwrap();

        let requests = net.loader.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].relays, vec!["wss://explicit"]);
        assert_eq!(requests[0].filters[0].kinds, Some(BTreeSet::from([KIND_RELAY_LIST])));
    }

    #[tokio::test]
    async fn test_repository_copy_shadows_older_events() {
        let a = Keypair::generate();
        let (net, loader) = setup(StaticRelaySelector::new().with_fallback(&["wss://r"]));
        net.repository.insert(profile(&a, 500, "local"));
        net.loader.add_event("wss://r", profile(&a, 100, "remote"));

        let summary = loader.load_profiles(&[a.public_key.clone()], LoadOptions::default()).await.unwrap();

        assert!(summary.events.is_empty());
        assert!(loader.profiles.get(&a.public_key).await.is_none());
    }

    #[tokio::test]
    async fn test_group_meta_filters_to_requested_addresses() {
        let admin = Keypair::generate();
        let wanted = GroupAddress::new(GroupVisibility::Public, admin.public_key.clone(), "g1").unwrap();
        let (net, loader) = setup(StaticRelaySelector::new().with_fallback(&["wss://r"]));
        net.loader.add_event("wss://r", test_event(KIND_PUBLIC_GROUP, &admin, 10, vec![Tag::identifier("g1")], "{}"));
        net.loader.add_event("wss://r", test_event(KIND_PUBLIC_GROUP, &admin, 20, vec![Tag::identifier("g2")], "{}"));

        let summary = loader.load_group_meta(&[wanted], LoadOptions::default()).await.unwrap();

        assert_eq!(summary.events.len(), 1);
        assert_eq!(summary.events[0].tag_value("d"), Some("g1"));
        assert_eq!(net.repository.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_empty_kinds() {
        let (_net, loader) = setup(StaticRelaySelector::new());
        let result = loader.load_batch(NAMESPACE_PROFILE, &[], &[Keypair::generate().public_key.clone()], LoadOptions::default()).await;
        assert!(matches!(result, Err(LoadError::NoKinds)));
    }
}
