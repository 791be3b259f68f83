//! In-memory event repository

use crate::core_event::{matches, Event, EventId, Filter};
use crate::traits::Repository;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryRepository {
    events: RwLock<HashMap<EventId, Event>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Repository for MemoryRepository {
    fn query(&self, filter: &Filter) -> Vec<Event> {
        let events = self.events.read().unwrap();
        let mut matching: Vec<Event> =
            events.values().filter(|e| matches(filter, e)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        matching
    }

    fn insert(&self, event: Event) {
        self.events.write().unwrap().insert(event.id, event);
    }
}
