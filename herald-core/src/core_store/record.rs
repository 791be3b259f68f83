/*
    record.rs - Field-wise Last-Write-Wins record

    A record is a set of named fields, each carrying its own timestamp.
    An update replaces a field only when its timestamp is strictly greater
    than the stored one; anything else is dropped silently because stale
    deliveries are normal when several relays answer out of order.

    Use cases:
    - Profile fields
    - Group membership status
    - Session fields
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A field value and the timestamp it was written at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEntry<V> {
    pub value: V,
    pub updated_at: u64,
}

/// Record with per-field LWW timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedRecord<V> {
    fields: BTreeMap<String, FieldEntry<V>>,

    /// Max of all field timestamps, never decreasing
    updated_at: u64,
}

impl<V: Clone> VersionedRecord<V> {
    /// Create an empty record
    pub fn new() -> Self {
        VersionedRecord { fields: BTreeMap::new(), updated_at: 0 }
    }

    /// Current value of a field
    pub fn get(&self, field: &str) -> Option<&V> {
        self.fields.get(field).map(|e| &e.value)
    }

    /// Value and timestamp of a field
    pub fn entry(&self, field: &str) -> Option<&FieldEntry<V>> {
        self.fields.get(field)
    }

    /// Record-level timestamp
    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldEntry<V>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Apply updates stamped with `timestamp` in place.
    ///
    /// Returns the number of fields that changed.
    pub fn apply<I>(&mut self, timestamp: u64, updates: I) -> usize
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let mut applied = 0;
        for (field, value) in updates {
            if self.set_field(field, value, timestamp) {
                applied += 1;
            }
        }
        applied
    }

    /// Field-wise merge of another replica into this one
    pub fn merge(&mut self, other: &VersionedRecord<V>) {
        for (field, entry) in &other.fields {
            self.set_field(field.clone(), entry.value.clone(), entry.updated_at);
        }
    }

    /// Absent fields behave as stamped at negative infinity, so any
    /// timestamp (including 0) wins over them.
    fn set_field(&mut self, field: String, value: V, timestamp: u64) -> bool {
        let wins = self.fields.get(&field).map_or(true, |e| timestamp > e.updated_at);
        if wins {
            self.fields.insert(field, FieldEntry { value, updated_at: timestamp });
            self.updated_at = self.updated_at.max(timestamp);
        }
        wins
    }
}

impl<V: Clone> Default for VersionedRecord<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `updates` stamped with `incoming_timestamp` into a copy of `existing`
pub fn merge_record<V, I>(
    existing: &VersionedRecord<V>,
    incoming_timestamp: u64,
    updates: I,
) -> VersionedRecord<V>
where
    V: Clone,
    I: IntoIterator<Item = (String, V)>,
{
    let mut record = existing.clone();
    record.apply(incoming_timestamp, updates);
    record
}
