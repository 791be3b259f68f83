//! Cooperative liveness
//!
//! Long-running loops (upload processing polls) never get interrupted in
//! the middle of a network call. They check `is_running()` between
//! suspension points, or race their waits against `wait_for_shutdown()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::future::Future;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Shutdown coordinator shared by every loop that should stop together
pub struct ShutdownCoordinator {
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { running: AtomicBool::new(true), shutdown_tx }
    }

    /// Whether loops should keep going
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flip the liveness flag and wake every waiter. Idempotent.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Shutdown requested");
            // No receivers is fine: pollers also check the flag
            let _ = self.shutdown_tx.send(());
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Resolve once shutdown has been requested
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        if !self.is_running() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Drive `fut` unless shutdown wins the race; `None` means it was cut short
    pub async fn run_until_shutdown<F: Future>(&self, fut: F) -> Option<F::Output> {
        if !self.is_running() {
            return None;
        }
        tokio::select! {
            out = fut => Some(out),
            _ = self.wait_for_shutdown() => {
                debug!("Wait interrupted by shutdown");
                None
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
