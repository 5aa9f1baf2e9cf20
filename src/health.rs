//! Minimal HTTP health and metrics endpoint

use crate::config::MetricsConfig;
use crate::lifecycle::{Component, Readiness, RunState};
use crate::metrics::Metrics;
use anyhow::Context;
use futures_util::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Serves `/health`, `/ready` and `/metrics`
pub struct HealthServer {
    config: MetricsConfig,
    metrics: Arc<Metrics>,
    state: watch::Receiver<RunState>,
    ready: Readiness,
    local_addr: OnceLock<SocketAddr>,
}

impl HealthServer {
    /// `state` decides `/ready`: only a fully running gateway is ready
    pub fn new(
        config: MetricsConfig,
        metrics: Arc<Metrics>,
        state: watch::Receiver<RunState>,
    ) -> Self {
        Self {
            config,
            metrics,
            state,
            ready: Readiness::new(),
            local_addr: OnceLock::new(),
        }
    }

    /// Check if the gateway is ready to take traffic
    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == RunState::Running
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    async fn serve(self: Arc<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("failed to listen on {}", self.config.listen_addr))?;
        let bound = listener.local_addr()?;
        let _ = self.local_addr.set(bound);
        info!("Health server listening on {}", bound);
        self.ready.set();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = listener.accept() => match result {
                    Ok((stream, _)) => {
                        let server = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream).await {
                                debug!("Health connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => error!("Health server accept error: {}", e),
                },
            }
        }

        info!("Health server stopped");
        Ok(())
    }

    /// Handle a single HTTP connection
    async fn handle_connection(&self, stream: TcpStream) -> std::io::Result<()> {
        let mut stream = BufReader::new(stream);
        let mut request_line = String::new();
        match tokio::time::timeout(READ_TIMEOUT, stream.read_line(&mut request_line)).await {
            Ok(result) => result?,
            Err(_) => return Ok(()),
        };

        // Parse simple HTTP request: "GET /path HTTP/1.1"
        let mut parts = request_line.split_whitespace();
        let (method, path) = match (parts.next(), parts.next()) {
            (Some(method), Some(path)) => (method, path),
            _ => return send_response(stream.get_mut(), 400, "text/plain", "Bad Request").await,
        };

        if method != "GET" {
            return send_response(stream.get_mut(), 405, "text/plain", "Method Not Allowed").await;
        }

        let (status, content_type, body) = self.route(path);
        send_response(stream.get_mut(), status, content_type, &body).await
    }

    fn route(&self, path: &str) -> (u16, &'static str, String) {
        match path {
            "/health" | "/healthz" => (200, "application/json", r#"{"status":"healthy"}"#.into()),
            "/ready" | "/readyz" => {
                if self.is_ready() {
                    (200, "application/json", r#"{"status":"ready"}"#.into())
                } else {
                    (503, "application/json", r#"{"status":"not ready"}"#.into())
                }
            }
            "/metrics" => match self.metrics.gather() {
                Ok(metrics) => (200, "text/plain; version=0.0.4", metrics),
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    (500, "text/plain", "Internal Server Error".into())
                }
            },
            _ => (404, "text/plain", "Not Found".into()),
        }
    }
}

impl Component for HealthServer {
    fn name(&self) -> &str {
        "health-server"
    }

    fn readiness(&self) -> Readiness {
        self.ready.clone()
    }

    fn run(self: Arc<Self>, shutdown: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(self.serve(shutdown))
    }
}

async fn send_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &str,
) -> std::io::Result<()> {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        content_type,
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}
