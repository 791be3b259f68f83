//! Metrics for observability
//!
//! Counters and histograms go through the `metrics` facade. Without an
//! installed recorder every call is a no-op, so the engine records
//! unconditionally and the embedding application decides where the numbers
//! go.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

/// Describe every metric the engine emits
pub fn init_metrics() {
    // Encryption layering
    describe_counter!("wrap.envelopes.modern", "Envelopes produced with the modern cipher suite");
    describe_counter!("wrap.envelopes.legacy", "Envelopes produced with the legacy cipher suite");

    // Publishing
    describe_counter!("publish.events.signed", "Events signed for publishing");
    describe_counter!("publish.relays.accepted", "Relay acknowledgements across all publishes");
    describe_counter!("publish.relays.failed", "Relay rejections and failures across all publishes");
    describe_counter!("publish.branches.rejected", "Group branches rejected by validation");
    describe_histogram!("publish.duration_ms", "Orchestrated publish duration in milliseconds");

    // Loading
    describe_counter!("loader.identities.stale", "Identities selected for refetch");
    describe_counter!("loader.events.received", "Events received from relays");
    describe_counter!("loader.relays.failed", "Relay fetches that failed");
    describe_counter!("loader.identities.unroutable", "Stale identities no relay could be asked for");

    // Receipts
    describe_counter!("receipts.chunks.published", "Read-receipt markers published");
    describe_gauge!("receipts.pending", "Event ids marked seen but not yet published");

    // Groups
    describe_counter!("groups.key_shares.sent", "Key shares, invites and evictions sent");

    // Uploads
    describe_counter!("upload.hosts.failed", "Media hosts that failed an upload");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a gauge metric
pub fn record_gauge(name: &'static str, value: f64) {
    gauge!(name).set(value);
}

/// Record a histogram metric
pub fn record_histogram(name: &'static str, value: f64) {
    histogram!(name).record(value);
}

/// Records elapsed milliseconds into a histogram when stopped
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        record_histogram(self.name, self.start.elapsed().as_secs_f64() * 1000.0);
    }
}
