//! Graceful shutdown coordination for long-running workers
//!
//! Projector workers hold in-flight deliveries and, in the batching case,
//! an unflushed buffer. The coordinator broadcasts a single shutdown signal
//! (SIGINT) so consume loops can stop pulling deliveries and flush residual
//! state before exiting.

use tokio::sync::watch;
use tracing::info;

/// Broadcasts the shutdown signal to any number of handles.
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Create a handle that resolves once shutdown is triggered.
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger shutdown for all handles.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Spawn a task that triggers shutdown on Ctrl-C.
    pub fn trigger_on_ctrl_c(&self) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = tx.send(true);
            }
        });
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the shutdown signal
#[derive(Clone)]
pub struct ShutdownHandle {
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    /// Wait until shutdown is triggered. Resolves immediately if it
    /// already was.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                // Coordinator dropped; treat as shutdown.
                return;
            }
        }
    }

    /// Non-blocking check.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_releases_handles() {
        let coordinator = ShutdownCoordinator::new();
        let mut handle = coordinator.handle();
        assert!(!handle.is_cancelled());

        coordinator.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle.cancelled())
            .await
            .expect("handle should resolve after trigger");
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_coordinator_counts_as_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let mut handle = coordinator.handle();
        drop(coordinator);
        tokio::time::timeout(Duration::from_secs(1), handle.cancelled())
            .await
            .expect("handle should resolve when coordinator is dropped");
    }

    #[tokio::test]
    async fn test_late_handle_sees_trigger() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.trigger();
        let handle = coordinator.handle();
        assert!(handle.is_cancelled());
    }
}
