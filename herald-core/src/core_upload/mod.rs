//! Media upload
//!
//! Sends the same blob to several media hosts at once. A host that fails is
//! dropped from the result instead of failing the upload. Hosts that answer
//! "still processing" are polled until they finish, the poll budget runs
//! out, or the engine shuts down; running out of time hands back the last
//! response seen.

mod uploader;

pub use uploader::Uploader;

use crate::core_event::Tag;
use async_trait::async_trait;
use thiserror::Error;

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

#[derive(Debug, Clone, Error)]
pub enum UploadError {
    #[error("No media hosts given")]
    NoHosts,

    #[error("Host {host} failed: {reason}")]
    Host { host: String, reason: String },
}

/// What a host returned for an upload or a processing check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResponse {
    /// Final media url, once available
    pub url: Option<String>,
    /// Where to ask again while the host is still processing
    pub processing_url: Option<String>,
    /// File metadata tags (`x`, `m`, `dim`, ...)
    pub tags: Vec<Tag>,
}

impl UploadResponse {
    pub fn complete(url: impl Into<String>) -> Self {
        Self { url: Some(url.into()), ..Default::default() }
    }

    pub fn processing(processing_url: impl Into<String>) -> Self {
        Self { processing_url: Some(processing_url.into()), ..Default::default() }
    }

    pub fn is_processing(&self) -> bool {
        self.url.is_none() && self.processing_url.is_some()
    }
}

/// Final state of one host's upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub host: String,
    pub response: UploadResponse,
    /// Processing never finished within the budget (or shutdown cut it short)
    pub timed_out: bool,
}

/// A media host endpoint
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Base url, used for logging and outcomes
    fn url(&self) -> &str;

    async fn upload(&self, data: &[u8], content_type: &str) -> UploadResult<UploadResponse>;

    /// Ask for the state of a delayed-processing upload
    async fn check(&self, processing_url: &str) -> UploadResult<UploadResponse>;
}
