//! Event model shared by every subsystem
//!
//! Events, tags, kinds, filters and timestamps are the `nostr` crate's own
//! types. This module adds what herald needs on top: its kind constants,
//! the caller-facing [`EventTemplate`], tag lookups by name and the
//! replaceable-event dedup key.
//!
//! Signing and id computation belong to the [`Signer`](crate::traits::Signer).

pub mod kinds;
pub mod types;

pub use kinds::*;
pub use nostr::filter::MatchEventOptions;
pub use nostr::{Event, EventId, Filter, Kind, PublicKey, Tag, TagKind, Tags, Timestamp, UnsignedEvent};
pub use types::{dedup_key, tag, EventExt, EventTemplate};

/// Current unix time in seconds
pub fn now() -> u64 {
    Timestamp::now().as_u64()
}

/// Whether `event` satisfies every constraint of `filter`
pub fn matches(filter: &Filter, event: &Event) -> bool {
    filter.match_event(event, MatchEventOptions::new())
}
