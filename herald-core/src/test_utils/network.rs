//! In-memory relay network for testing
//!
//! `MemoryPublisher` records every publish call and can be told to fail
//! individual relays or everything. `MemoryLoader` serves canned events per
//! relay through the filters it receives.

use crate::core_event::{matches, Event, Kind};
use crate::traits::{
    LoadRequest, Loader, PublishOutcome, Publisher, RelayStatus, TransportError,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One recorded publish call
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: Event,
    pub relays: Vec<String>,
}

#[derive(Default)]
pub struct MemoryPublisher {
    published: Arc<Mutex<Vec<PublishedEvent>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    fail_all: AtomicBool,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `relay` as failed on every publish
    pub fn fail_relay(&self, relay: impl Into<String>) {
        self.failing.lock().unwrap().insert(relay.into());
    }

    /// Make every publish call return a transport error
    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedEvent> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_kinds(&self) -> Vec<Kind> {
        self.published().iter().map(|p| p.event.kind).collect()
    }

    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(
        &self,
        event: &Event,
        relays: &[String],
    ) -> Result<PublishOutcome, TransportError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("all relays".to_string()));
        }

        self.published
            .lock()
            .unwrap()
            .push(PublishedEvent { event: event.clone(), relays: relays.to_vec() });

        let failing = self.failing.lock().unwrap();
        let statuses: BTreeMap<String, RelayStatus> = relays
            .iter()
            .map(|relay| {
                let status = if failing.contains(relay) {
                    RelayStatus::Failed("connection refused".to_string())
                } else {
                    RelayStatus::Accepted
                };
                (relay.clone(), status)
            })
            .collect();

        Ok(PublishOutcome { event_id: event.id.to_hex(), statuses })
    }
}

#[derive(Default)]
pub struct MemoryLoader {
    events: Arc<Mutex<HashMap<String, Vec<Event>>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    requests: Arc<Mutex<Vec<LoadRequest>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `event` from `relay`
    pub fn add_event(&self, relay: impl Into<String>, event: Event) {
        self.events.lock().unwrap().entry(relay.into()).or_default().push(event);
    }

    pub fn fail_relay(&self, relay: impl Into<String>) {
        self.failing.lock().unwrap().insert(relay.into());
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<LoadRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn load(
        &self,
        request: LoadRequest,
        events: mpsc::UnboundedSender<Event>,
    ) -> Result<(), TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        // Let sibling requests interleave as they would over a socket
        tokio::task::yield_now().await;

        let matching: Vec<Event> = {
            let failing = self.failing.lock().unwrap();
            if let Some(relay) = request.relays.iter().find(|r| failing.contains(*r)) {
                return Err(TransportError::Unreachable(relay.clone()));
            }

            let stored = self.events.lock().unwrap();
            request
                .relays
                .iter()
                .filter_map(|relay| stored.get(relay))
                .flatten()
                .filter(|event| request.filters.iter().any(|f| matches(f, event)))
                .cloned()
                .collect()
        };

        for event in matching {
            // Receiver gone means the caller stopped listening
            if events.send(event).is_err() {
                break;
            }
        }
        Ok(())
    }
}
