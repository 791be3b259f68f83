//! Local state reconciled from the network
//!
//! - `record`: field-wise LWW merge used for profiles, access status and sessions
//! - `freshness`: last-seen timestamps and backoff counters for the loader
//! - `profile`: kind-0 profiles merged per field

pub mod freshness;
pub mod profile;
pub mod record;

pub use freshness::{FreshnessStore, NAMESPACE_GROUPS, NAMESPACE_PROFILE, NAMESPACE_RELAYS};
pub use profile::ProfileIndex;
pub use record::{merge_record, FieldEntry, VersionedRecord};
