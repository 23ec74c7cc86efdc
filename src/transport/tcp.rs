use crate::error::RpcError;
use crate::rpc::RpcServer;
use crate::server::metrics::Metrics;
use crate::transport::framing::Framing;
use crate::transport::session::serve_connection;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

pub struct TcpServerConfig {
    pub addr: String,
    pub server: Arc<RpcServer>,
    pub framing: Framing,
    pub metrics: Arc<Metrics>,
    /// `None` keeps the accept loop unbounded.
    pub max_connections: Option<usize>,
}

impl TcpServerConfig {
    pub fn new(addr: impl Into<String>, server: Arc<RpcServer>) -> Self {
        Self {
            addr: addr.into(),
            server,
            framing: Framing::LengthPrefixed,
            metrics: Arc::new(Metrics::new()),
            max_connections: None,
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_max_connections(mut self, max: Option<usize>) -> Self {
        self.max_connections = max;
        self
    }
}

/// A bound TCP listener that spawns one session task per connection.
pub struct TcpServer {
    listener: TcpListener,
    server: Arc<RpcServer>,
    framing: Framing,
    metrics: Arc<Metrics>,
    limit: Option<Arc<Semaphore>>,
}

impl TcpServer {
    pub async fn bind(config: TcpServerConfig) -> Result<Self, RpcError> {
        let listener = TcpListener::bind(&config.addr)
            .await
            .map_err(|source| RpcError::Bind {
                addr: config.addr.clone(),
                source,
            })?;

        Ok(Self {
            listener,
            server: config.server,
            framing: config.framing,
            metrics: config.metrics,
            limit: config.max_connections.map(|n| Arc::new(Semaphore::new(n))),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RpcError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), RpcError> {
        info!(
            "TCP RPC server listening on {} ({:?})",
            self.local_addr()?,
            self.framing
        );

        let mut accept_failures: u32 = 0;
        loop {
            // Hold a permit before accepting when connections are bounded
            let permit = match &self.limit {
                Some(limit) => tokio::select! {
                    permit = limit.clone().acquire_owned() => match permit {
                        Ok(p) => Some(p),
                        Err(_) => break,
                    },
                    _ = shutdown.recv() => break,
                },
                None => None,
            };

            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((socket, peer)) => {
                            accept_failures = 0;
                            let server = self.server.clone();
                            let metrics = self.metrics.clone();
                            let framing = self.framing;
                            let span = info_span!("session", id = %Uuid::new_v4(), %peer);

                            tokio::spawn(
                                async move {
                                    info!("Connection opened");
                                    if let Err(e) = serve_connection(server, socket, framing, metrics).await {
                                        error!("Connection error: {}", e);
                                    }
                                    info!("Connection closed");
                                    drop(permit);
                                }
                                .instrument(span),
                            );
                        }
                        Err(e) => {
                            accept_failures = accept_failures.saturating_add(1);
                            let delay = accept_backoff(accept_failures);
                            error!("Failed to accept connection: {} (retrying in {:?})", e, delay);
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = shutdown.recv() => break,
                            }
                        }
                    }
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        info!("Shutting down TCP server");
        self.metrics.snapshot().await.log();
        Ok(())
    }
}

/// Delay before the next accept after `failures` consecutive accept errors.
///
/// Doubles from 10ms up to 1s, so a persistent failure such as EMFILE does not
/// spin the accept loop.
fn accept_backoff(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(7);
    Duration::from_millis(10 << exp).min(Duration::from_secs(1))
}

/// Bind `config.addr` and serve until `shutdown` fires.
pub async fn run_with_framing(
    config: TcpServerConfig,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), RpcError> {
    TcpServer::bind(config).await?.run(shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_backoff_grows_and_caps() {
        assert_eq!(accept_backoff(1), Duration::from_millis(10));
        assert_eq!(accept_backoff(2), Duration::from_millis(20));
        assert_eq!(accept_backoff(5), Duration::from_millis(160));
        assert_eq!(accept_backoff(8), Duration::from_secs(1));
        assert_eq!(accept_backoff(u32::MAX), Duration::from_secs(1));
    }
}
