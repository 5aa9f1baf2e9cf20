//! Connection handling for individual client connections

use super::{Server, guard};
use crate::protocol::{Command, ParseResult, ResponseWriter, find_crlf, parse};
use crate::storage::Storage;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle a single client connection
pub async fn handle<S: Storage>(
    server: Arc<Server<S>>,
    mut stream: TcpStream,
    peer: SocketAddr,
    _permit: OwnedSemaphorePermit,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let _active = ActiveConnection(&server);
    let mut read_buf = BytesMut::with_capacity(server.config.read_buffer_size);
    let mut response = ResponseWriter::new(server.config.write_buffer_size);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                break;
            }
            result = stream.read_buf(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        // Connection closed
                        break;
                    }
                    Ok(n) => {
                        server.metrics.bytes_read.inc_by(n as u64);

                        // Process all complete commands in the buffer
                        loop {
                            let parse_result = parse(&read_buf);

                            match parse_result {
                                ParseResult::Complete(cmd, consumed) => {
                                    let should_quit = matches!(cmd, Command::Quit);
                                    let noreply = cmd.is_noreply();

                                    guard::dispatch(&server, cmd, peer, &mut response).await;

                                    // Consume processed bytes
                                    let _ = read_buf.split_to(consumed);

                                    if !noreply && !response.is_empty() {
                                        let buf = response.take();
                                        server.metrics.bytes_written.inc_by(buf.len() as u64);
                                        stream.write_all(&buf).await?;
                                    }
                                    response.clear();

                                    if should_quit {
                                        return Ok(());
                                    }
                                }
                                ParseResult::NeedMoreData => break,
                                ParseResult::Error(e) => {
                                    server.metrics.protocol_errors.inc();
                                    debug!(%peer, "protocol error: {}", e);
                                    response.client_error(&e.to_string());

                                    // Try to recover by finding next command
                                    if let Some(pos) = find_crlf(&read_buf) {
                                        let _ = read_buf.split_to(pos + 2);
                                    } else {
                                        read_buf.clear();
                                    }

                                    let buf = response.take();
                                    server.metrics.bytes_written.inc_by(buf.len() as u64);
                                    stream.write_all(&buf).await?;
                                    response.clear();
                                }
                            }
                        }
                    }
                    Err(e) => {
                        debug!("Read error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Keeps the active connection gauge honest on every exit path
struct ActiveConnection<'a, S>(&'a Server<S>);

impl<S> Drop for ActiveConnection<'_, S> {
    fn drop(&mut self) {
        self.0.metrics.active_connections.dec();
    }
}
