//! Front-end TCP server speaking the memcached text protocol

mod connection;
mod guard;
mod handler;

use crate::config::ServerConfig;
use crate::lifecycle::{Component, Readiness};
use crate::metrics::Metrics;
use crate::storage::Storage;
use anyhow::Context;
use futures_util::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Main server struct
pub struct Server<S> {
    pub(crate) config: ServerConfig,
    pub(crate) storage: Arc<S>,
    pub(crate) metrics: Arc<Metrics>,
    connection_semaphore: Arc<Semaphore>,
    ready: Readiness,
    local_addr: OnceLock<SocketAddr>,
}

impl<S: Storage> Server<S> {
    /// Create a new server
    pub fn new(config: ServerConfig, storage: Arc<S>, metrics: Arc<Metrics>) -> Self {
        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Self {
            config,
            storage,
            metrics,
            connection_semaphore,
            ready: Readiness::new(),
            local_addr: OnceLock::new(),
        }
    }

    /// Address the listener is bound to, once running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Accept connections until `shutdown` is cancelled, then wait for the
    /// open connections to wind down
    async fn serve(self: Arc<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address {}", self.config.listen_addr))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to listen on {addr}"))?;
        let bound = listener.local_addr()?;
        let _ = self.local_addr.set(bound);

        info!("Server listening on {}", bound);
        self.ready.set();

        let connections = TaskTracker::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Server shutting down");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            // Disable Nagle's algorithm for lower latency
                            if let Err(e) = stream.set_nodelay(true) {
                                warn!("Failed to set TCP_NODELAY: {}", e);
                            }

                            // Try to acquire connection permit
                            match self.connection_semaphore.clone().try_acquire_owned() {
                                Ok(permit) => {
                                    self.metrics.total_connections.inc();
                                    self.metrics.active_connections.inc();
                                    debug!("Accepted connection from {}", peer_addr);

                                    let server = Arc::clone(&self);
                                    let shutdown = shutdown.clone();
                                    connections.spawn(async move {
                                        if let Err(e) = connection::handle(server, stream, peer_addr, permit, shutdown).await {
                                            debug!("Connection error: {}", e);
                                        }
                                    });
                                }
                                Err(_) => {
                                    // Connection limit reached
                                    self.metrics.rejected_connections.inc();
                                    warn!("Connection limit reached, rejecting connection from {}", peer_addr);
                                    drop(stream);
                                }
                            }
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }

        connections.close();
        if !connections.is_empty() {
            info!("Waiting for {} connection(s) to close", connections.len());
        }
        connections.wait().await;
        Ok(())
    }
}

impl<S: Storage> Component for Server<S> {
    fn name(&self) -> &str {
        "api-server"
    }

    fn readiness(&self) -> Readiness {
        self.ready.clone()
    }

    fn run(self: Arc<Self>, shutdown: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(self.serve(shutdown))
    }
}
