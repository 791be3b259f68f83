use super::{MediaHost, UploadError, UploadOutcome, UploadResponse, UploadResult};
use crate::config::Config;
use crate::metrics::record_counter;
use crate::shutdown::ShutdownCoordinator;
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

pub struct Uploader {
    config: Arc<Config>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl Uploader {
    pub fn new(config: Arc<Config>, shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self { config, shutdown }
    }

    /// Upload `data` to every host concurrently.
    ///
    /// Returns the hosts that succeeded, in the order given. Failed hosts
    /// are logged and left out.
    pub async fn upload_to_hosts(
        &self,
        hosts: &[Arc<dyn MediaHost>],
        data: &[u8],
        content_type: &str,
    ) -> UploadResult<Vec<UploadOutcome>> {
        if hosts.is_empty() {
            return Err(UploadError::NoHosts);
        }

        let attempts = hosts.iter().map(|host| self.upload_one(host.as_ref(), data, content_type));
        let results = join_all(attempts).await;

        let outcomes: Vec<UploadOutcome> = results
            .into_iter()
            .filter_map(|result| match result {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(error = %e, "Media host failed");
                    record_counter("upload.hosts.failed", 1);
                    None
                }
            })
            .collect();

        info!(hosts = hosts.len(), succeeded = outcomes.len(), bytes = data.len(), "Upload settled");
        Ok(outcomes)
    }

    async fn upload_one(&self, host: &dyn MediaHost, data: &[u8], content_type: &str) -> UploadResult<UploadOutcome> {
        let response = host.upload(data, content_type).await?;
        if response.is_processing() {
            return Ok(self.wait_for_processing(host, response).await);
        }
        Ok(UploadOutcome { host: host.url().to_string(), response, timed_out: false })
    }

    /// Poll until processing completes or the budget is spent.
    ///
    /// A failed check keeps the previous response and tries again on the
    /// next tick.
    async fn wait_for_processing(&self, host: &dyn MediaHost, initial: UploadResponse) -> UploadOutcome {
        let upload = &self.config.upload;
        let deadline = Instant::now() + upload.poll_budget;
        let mut last = initial;

        while last.is_processing() {
            let now = Instant::now();
            if now >= deadline || !self.shutdown.is_running() {
                break;
            }

            let wait = upload.poll_interval.min(deadline - now);
            if self.shutdown.run_until_shutdown(sleep(wait)).await.is_none() {
                break;
            }

            let Some(processing_url) = last.processing_url.clone() else {
                break;
            };
            match host.check(&processing_url).await {
                Ok(response) => last = response,
                Err(e) => debug!(host = host.url(), error = %e, "Processing check failed"),
            }
        }

        let timed_out = last.is_processing();
        if timed_out {
            warn!(host = host.url(), "Gave up waiting for media processing");
        }
        UploadOutcome { host: host.url().to_string(), response: last, timed_out }
    }
}
