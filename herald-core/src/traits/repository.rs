//! Repository Trait
//!
//! Synchronous local event store.

use crate::core_event::{Event, Filter, Kind, PublicKey};

pub trait Repository: Send + Sync {
    /// Events matching `filter`
    fn query(&self, filter: &Filter) -> Vec<Event>;

    /// Store an event
    fn insert(&self, event: Event);

    /// Most recent locally known event of `kind` by `author`
    fn latest(&self, kind: Kind, author: &str) -> Option<Event> {
        let author = PublicKey::from_hex(author).ok()?;
        self.query(&Filter::new().kind(kind).author(author))
            .into_iter()
            .max_by_key(|e| e.created_at)
    }
}
