//! Freshness-Gated Loader
//!
//! Fetches per-identity metadata (profiles, relay lists, group definitions)
//! only for identities whose freshness has lapsed, with a per-identity
//! backoff for identities that keep coming back empty.
//!
//! # Flow
//!
//! ```text
//! identities ─▶ FreshnessStore::select_stale ─▶ (empty? done)
//!                                                 │
//!               RelaySelector::partition_by_outbox ▼
//!            relay A: [pk1, pk2]   relay B: [pk3]  ...
//!                   │                    │
//!              Loader::load         Loader::load      (concurrently)
//!                   └──── events ────────┘
//!                          │
//!          touch freshness, dedupe newest per (kind, author[, d])
//! ```

mod loader;

pub use loader::FreshnessLoader;

use crate::core_event::Event;
use std::time::Duration;
use thiserror::Error;

/// Result type for loader operations
pub type LoadResult<T> = Result<T, LoadError>;

/// Loader errors. Relay failures are not errors; see [`LoadSummary::failed_relays`].
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("No event kinds requested")]
    NoKinds,

    #[error("Empty freshness namespace")]
    EmptyNamespace,
}

/// Per-call loading options
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Skip the freshness test (identity validation still applies)
    pub force: bool,

    /// Query exactly these relays instead of each identity's outbox relays
    pub relays: Option<Vec<String>>,

    /// Ask the loader to bypass its own cache
    pub skip_cache: bool,

    /// Override the namespace's configured base refetch interval
    pub base_delta: Option<Duration>,
}

impl LoadOptions {
    pub fn forced() -> Self {
        Self { force: true, ..Default::default() }
    }

    pub fn with_relays(mut self, relays: Vec<String>) -> Self {
        self.relays = Some(relays);
        self
    }
}

/// What one batch load did
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    /// Identities that were stale and got requested
    pub requested: Vec<String>,

    /// Newest event per replaceable key, newest first
    pub events: Vec<Event>,

    /// Relays whose fetch failed and were skipped
    pub failed_relays: Vec<String>,
}

impl LoadSummary {
    /// Whether the batch went to the network at all
    pub fn fetched(&self) -> bool {
        !self.requested.is_empty()
    }
}
