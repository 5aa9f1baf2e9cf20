//! Command handlers for the front-end protocol

use super::Server;
use crate::error::{ErrorKind, StorageError};
use crate::metrics::Metrics;
use crate::protocol::{Command, ResponseWriter};
use crate::storage::Storage;
use bytes::Bytes;

/// Execute a parsed command against the storage.
///
/// Only successful outcomes are written here; storage errors are returned
/// so the caller can classify them once.
pub async fn execute<S: Storage>(
    server: &Server<S>,
    cmd: Command<'_>,
    response: &mut ResponseWriter,
) -> Result<(), StorageError> {
    match cmd {
        Command::Get { key } => {
            server.metrics.cmd_get.inc();
            handle_get(server, &key, response).await
        }
        // flags and exptime are wire-only; the storage keeps plain bytes
        Command::Set { key, data, .. } => {
            server.metrics.cmd_set.inc();
            handle_set(server, &key, &data, response).await
        }
        Command::Delete { key, .. } => {
            server.metrics.cmd_delete.inc();
            handle_delete(server, &key, response).await
        }
        Command::Version => {
            handle_version(response);
            Ok(())
        }
        Command::Quit => {
            // Handled in connection loop
            Ok(())
        }
    }
}

/// Write the response for a failed command
pub fn respond_error(
    method: &str,
    kind: ErrorKind,
    err: &StorageError,
    metrics: &Metrics,
    response: &mut ResponseWriter,
) {
    response.clear();
    match kind {
        ErrorKind::NotFound => match method {
            "get" => {
                metrics.get_misses.inc();
                response.end();
            }
            "set" => response.not_stored(),
            _ => response.not_found(),
        },
        ErrorKind::Unknown => {
            metrics.unknown_errors.inc();
            response.server_error(&format!("unknown: {err}"));
        }
        ErrorKind::Internal => {
            metrics.internal_errors.inc();
            response.server_error(&err.to_string());
        }
    }
}

fn handle_version(response: &mut ResponseWriter) {
    response.version(concat!("kvgate ", env!("CARGO_PKG_VERSION")));
}

async fn handle_get<S: Storage>(
    server: &Server<S>,
    key: &[u8],
    response: &mut ResponseWriter,
) -> Result<(), StorageError> {
    let value = server.storage.get(&String::from_utf8_lossy(key)).await?;
    server.metrics.get_hits.inc();
    response.value(key, 0, &value);
    response.end();
    Ok(())
}

async fn handle_set<S: Storage>(
    server: &Server<S>,
    key: &[u8],
    data: &[u8],
    response: &mut ResponseWriter,
) -> Result<(), StorageError> {
    server
        .storage
        .set(&String::from_utf8_lossy(key), Bytes::copy_from_slice(data))
        .await?;
    response.stored();
    Ok(())
}

async fn handle_delete<S: Storage>(
    server: &Server<S>,
    key: &[u8],
    response: &mut ResponseWriter,
) -> Result<(), StorageError> {
    server.storage.delete(&String::from_utf8_lossy(key)).await?;
    response.deleted();
    Ok(())
}
