use super::{Broadcaster, ConnectionWorker, RelayError};
use crate::config::RelayConfig;
use crate::metrics::RelayMetrics;
use crate::registry::Registry;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// TCP front end of the relay: one accept loop, one task per connection
pub struct RelayServer {
    listener: TcpListener,
    broadcaster: Broadcaster,
}

impl RelayServer {
    /// Bind the listener described by `config`
    pub async fn bind(config: &RelayConfig, metrics: RelayMetrics) -> Result<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind relay listener on {}", addr))?;

        let registry = Arc::new(Registry::new(config.capacity_per_category));
        Ok(Self::from_listener(
            listener,
            Broadcaster::new(registry, metrics, config.echo_policy),
        ))
    }

    /// Wrap an already bound listener
    pub fn from_listener(listener: TcpListener, broadcaster: Broadcaster) -> Self {
        Self {
            listener,
            broadcaster,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read relay listener address")
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(self.broadcaster.registry())
    }

    /// Accept connections forever
    pub async fn run(self) {
        info!(address = ?self.listener.local_addr().ok(), "Relay listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => self.spawn_worker(stream, peer_addr),
                Err(e) => {
                    // Accept errors (e.g. fd exhaustion) only affect that one attempt
                    warn!(error = %e, "Accept failed");
                }
            }
        }
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = self.run() => {}
            _ = shutdown => {
                info!("Relay shutting down");
            }
        }
    }

    fn spawn_worker(&self, stream: TcpStream, peer_addr: SocketAddr) {
        debug!(peer = %peer_addr, "Connection accepted");

        let mut worker = ConnectionWorker::new(self.broadcaster.clone());
        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            match worker.run(reader, writer).await {
                Ok(summary) => {
                    debug!(
                        peer = %peer_addr,
                        connection = %summary.id,
                        records = summary.records_relayed,
                        "Connection closed"
                    );
                }
                Err(RelayError::RegistrationFailed(reason)) => {
                    warn!(peer = %peer_addr, reason = %reason, "Registration failed, connection closed");
                }
                Err(e) => {
                    error!(peer = %peer_addr, error = %e, "Connection worker failed");
                }
            }
        });
    }
}
