use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Broadcasts a single shutdown notice to every listener that subscribed.
///
/// ```rust,no_run
/// use greet_rpc::transport::shutdown::ShutdownCoordinator;
/// use std::sync::Arc;
///
/// # async fn demo() {
/// let shutdown = Arc::new(ShutdownCoordinator::new());
/// let rx = shutdown.subscribe();
/// let signals = shutdown.clone();
/// tokio::spawn(async move { signals.wait_for_signal().await });
/// // hand `rx` to the accept loop
/// # drop(rx);
/// # }
/// ```
pub struct ShutdownCoordinator {
    tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn shutdown(&self) {
        // no receivers left means nothing is running
        let _ = self.tx.send(());
    }

    /// Wait for SIGINT/SIGTERM (CTRL+C off unix), then broadcast shutdown.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use signal::unix::{SignalKind, signal};

            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                        _ = sigint.recv() => info!("Received SIGINT (CTRL+C)"),
                    }
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Cannot install unix signal handlers ({}), using CTRL+C only", e);
                    wait_for_ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        wait_for_ctrl_c().await;

        info!("Initiating graceful shutdown...");
        self.shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received CTRL+C"),
        Err(e) => {
            warn!("Cannot listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Completes once shutdown has been broadcast or the coordinator is gone.
pub async fn wait_for_shutdown(mut rx: broadcast::Receiver<()>) {
    let _ = rx.recv().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx1 = coordinator.subscribe();
        let mut rx2 = coordinator.subscribe();

        coordinator.shutdown();

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_completes() {
        let coordinator = ShutdownCoordinator::new();
        let rx = coordinator.subscribe();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            coordinator.shutdown();
        });

        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_coordinator_releases_waiters() {
        let coordinator = ShutdownCoordinator::new();
        let rx = coordinator.subscribe();
        drop(coordinator);

        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(rx))
            .await
            .unwrap();
    }
}
