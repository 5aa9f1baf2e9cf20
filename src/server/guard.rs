//! Request boundary: per-request logging, error classification and panic
//! recovery around the command handlers

use super::{Server, handler};
use crate::error::{ErrorKind, classify};
use crate::protocol::{Command, ResponseWriter};
use crate::storage::Storage;
use futures_util::FutureExt;
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

/// Run one command through the handlers.
///
/// Always leaves a complete response in `response`, even when the handler
/// fails or panics, so the connection stays usable.
pub async fn dispatch<S: Storage>(
    server: &Server<S>,
    cmd: Command<'_>,
    peer: SocketAddr,
    response: &mut ResponseWriter,
) {
    let method = cmd.name();
    let span = info_span!("request", request_id = %Uuid::new_v4(), %peer, method);

    async move {
        if let Some(key) = cmd.key() {
            debug!(key = %String::from_utf8_lossy(key), "request received");
        }

        let start = Instant::now();
        let outcome = AssertUnwindSafe(handler::execute(server, cmd, response))
            .catch_unwind()
            .await;
        let elapsed = start.elapsed();
        server.metrics.cmd_latency.observe(elapsed.as_secs_f64());
        let duration_us = elapsed.as_micros() as u64;

        match outcome {
            Ok(Ok(())) => info!(duration_us, "request completed"),
            Ok(Err(err)) => {
                let kind = classify(&err);
                handler::respond_error(method, kind, &err, &server.metrics, response);
                match kind {
                    ErrorKind::NotFound => info!(duration_us, "key not found"),
                    ErrorKind::Unknown => {
                        error!(duration_us, error = %err, "request failed with an unknown response")
                    }
                    ErrorKind::Internal => error!(duration_us, error = %err, "request failed"),
                }
            }
            Err(panic) => {
                server.metrics.recovered_panics.inc();
                response.clear();
                response.server_error("internal error");
                error!(duration_us, panic = panic_message(&*panic), "recovered from handler panic");
            }
        }
    }
    .instrument(span)
    .await
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;
    use crate::config::ServerConfig;
    use crate::metrics::Metrics;
    use crate::storage::MemoryStorage;
    use bytes::Bytes;
    use std::borrow::Cow;
    use std::sync::Arc;

    struct Exploding;

    impl Storage for Exploding {
        async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
            panic!("boom on {key}")
        }

        async fn set(&self, _key: &str, _value: Bytes) -> Result<(), StorageError> {
            Err(StorageError::NotReady)
        }

        async fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::NotFound)
        }
    }

    fn server<S: Storage>(storage: S) -> Server<S> {
        Server::new(
            ServerConfig::default(),
            Arc::new(storage),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_panic_becomes_server_error() {
        let server = server(Exploding);
        let mut response = ResponseWriter::new(64);

        let cmd = Command::Get {
            key: Cow::Borrowed(b"k"),
        };
        dispatch(&server, cmd, peer(), &mut response).await;

        assert_eq!(
            response.take().as_ref(),
            b"SERVER_ERROR internal error\r\n"
        );
        assert_eq!(server.metrics.recovered_panics.get(), 1);

        // the boundary keeps serving after a panic
        dispatch(&server, Command::Version, peer(), &mut response).await;
        assert!(response.take().starts_with(b"VERSION "));
    }

    #[tokio::test]
    async fn test_errors_are_classified() {
        let server = server(Exploding);
        let mut response = ResponseWriter::new(64);

        let cmd = Command::Delete {
            key: Cow::Borrowed(b"k"),
            noreply: false,
        };
        dispatch(&server, cmd, peer(), &mut response).await;
        assert_eq!(response.take().as_ref(), b"NOT_FOUND\r\n");

        let cmd = Command::Set {
            key: Cow::Borrowed(b"k"),
            flags: 0,
            exptime: 0,
            data: Cow::Borrowed(b"v"),
            noreply: false,
        };
        dispatch(&server, cmd, peer(), &mut response).await;
        assert_eq!(
            response.take().as_ref(),
            b"SERVER_ERROR storage is not ready\r\n"
        );
        assert_eq!(server.metrics.internal_errors.get(), 1);
    }

    #[tokio::test]
    async fn test_success_path() {
        let server = server(MemoryStorage::new());
        let mut response = ResponseWriter::new(64);

        let cmd = Command::Set {
            key: Cow::Borrowed(b"k"),
            flags: 0,
            exptime: 0,
            data: Cow::Borrowed(b""),
            noreply: false,
        };
        dispatch(&server, cmd, peer(), &mut response).await;
        assert_eq!(response.take().as_ref(), b"STORED\r\n");

        let cmd = Command::Get {
            key: Cow::Borrowed(b"k"),
        };
        dispatch(&server, cmd, peer(), &mut response).await;
        assert_eq!(response.take().as_ref(), b"VALUE k 0 0\r\n\r\nEND\r\n");
        assert_eq!(server.metrics.get_hits.get(), 1);
        assert_eq!(server.metrics.cmd_latency.get_sample_count(), 2);
    }
}
