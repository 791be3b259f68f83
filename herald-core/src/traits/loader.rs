//! Loader Trait
//!
//! Runs filters against relays. Events are streamed back through a channel
//! as they arrive; the call resolves once the request settles (EOSE or
//! timeout on every relay).

use super::TransportError;
use crate::core_event::{Event, Filter};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One fetch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub filters: Vec<Filter>,
    pub relays: Vec<String>,
    /// Bypass any caching layer inside the loader
    pub skip_cache: bool,
}

#[async_trait]
pub trait Loader: Send + Sync {
    /// Run `request`, sending every received event to `events`
    async fn load(
        &self,
        request: LoadRequest,
        events: mpsc::UnboundedSender<Event>,
    ) -> Result<(), TransportError>;
}
