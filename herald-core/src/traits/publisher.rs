//! Publisher Trait
//!
//! Sends one signed event to a set of relays and reports per-relay outcomes.

use super::TransportError;
use crate::core_event::Event;
use crate::metrics::record_counter;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Result of sending an event to one relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    Accepted,
    Rejected(String),
    Failed(String),
}

/// Per-relay outcome of one publish call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub event_id: String,
    pub statuses: BTreeMap<String, RelayStatus>,
}

impl PublishOutcome {
    /// Outcome in which every relay failed with the same reason
    pub fn failed(event_id: impl Into<String>, relays: &[String], reason: &str) -> Self {
        Self {
            event_id: event_id.into(),
            statuses: relays
                .iter()
                .map(|r| (r.clone(), RelayStatus::Failed(reason.to_string())))
                .collect(),
        }
    }

    pub fn accepted_count(&self) -> usize {
        self.statuses.values().filter(|s| **s == RelayStatus::Accepted).count()
    }

    pub fn failed_count(&self) -> usize {
        self.statuses.len() - self.accepted_count()
    }
}

/// An event paired with the relays it goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub event: Event,
    pub relays: Vec<String>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Send `event` to every relay in `relays`
    async fn publish(
        &self,
        event: &Event,
        relays: &[String],
    ) -> Result<PublishOutcome, TransportError>;
}

/// Publish a target without letting a transport failure escape.
///
/// A publisher error is folded into the outcome as `Failed` for every relay
/// so sibling dispatches still settle.
pub async fn publish_best_effort(publisher: &dyn Publisher, target: &PublishTarget) -> PublishOutcome {
    if target.relays.is_empty() {
        warn!(event_id = %target.event.id, "No relays selected for event");
        return PublishOutcome { event_id: target.event.id.to_hex(), statuses: BTreeMap::new() };
    }

    let outcome = match publisher.publish(&target.event, &target.relays).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(event_id = %target.event.id, error = %e, "Publish failed");
            PublishOutcome::failed(target.event.id.to_hex(), &target.relays, &e.to_string())
        }
    };

    debug!(
        event_id = %outcome.event_id,
        accepted = outcome.accepted_count(),
        failed = outcome.failed_count(),
        "Publish settled"
    );
    record_counter("publish.relays.accepted", outcome.accepted_count() as u64);
    record_counter("publish.relays.failed", outcome.failed_count() as u64);

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_outcome_marks_every_relay() {
        let relays = vec!["wss://a".to_string(), "wss://b".to_string()];
        let outcome = PublishOutcome::failed("id", &relays, "boom");
        assert_eq!(outcome.statuses.len(), 2);
        assert_eq!(outcome.accepted_count(), 0);
        assert_eq!(outcome.failed_count(), 2);
    }
}
