//! Herald - publication engine for a signed-event, multi-relay messaging client
//!
//! Turns application-level intents (notes, group invites, direct messages,
//! read receipts, profile updates) into encrypted, addressed and routed
//! signed events, and tracks which remote metadata is fresh enough to skip
//! re-fetching.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   Herald                     │
//! │  core_publish ── core_group ── core_wrap     │
//! │  core_loader  ── core_store (LWW, freshness) │
//! └──────┬──────────┬───────────┬────────────────┘
//!        ▼          ▼           ▼
//!     Signer    Publisher    Loader / RelaySelector / Repository
//! ```

pub mod config;
pub mod logging;
pub mod metrics;
pub mod shutdown;

pub mod core_engine;
pub mod core_event;
pub mod core_group;
pub mod core_identity;
pub mod core_loader;
pub mod core_publish;
pub mod core_session;
pub mod core_store;
pub mod core_upload;
pub mod core_wrap;
pub mod traits;

pub mod test_utils;

pub use config::Config;
pub use core_engine::Herald;
pub use logging::{init_logging, LogLevel};
