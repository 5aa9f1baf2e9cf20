//! Fixed-size memcached connection pool
//!
//! A semaphore with `size` permits bounds concurrent checkouts; the idle
//! slots live in a plain vector behind a `parking_lot` mutex. A checkout is
//! an RAII guard, so the slot goes back even when the caller's future is
//! dropped halfway through a command.

use crate::error::ClientError;
use crate::memcache::connection::Connection;
use bytes::Bytes;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

/// Opens transports for the pool
pub trait Dial: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Human readable dial target, used in errors and logs
    fn target(&self) -> &str;

    fn dial(&self) -> impl Future<Output = std::io::Result<Self::Stream>> + Send;
}

/// Dials TCP connections to a fixed address
#[derive(Debug, Clone)]
pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Dial for TcpDialer {
    type Stream = TcpStream;

    fn target(&self) -> &str {
        &self.addr
    }

    async fn dial(&self) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// A pool slot; `None` once its connection has been retired
type Slot<S> = Option<Connection<S>>;

/// Pool of `size` connections with exclusive, blocking checkout
pub struct Pool<D: Dial = TcpDialer> {
    dialer: D,
    size: usize,
    permits: Semaphore,
    idle: Mutex<Vec<Slot<D::Stream>>>,
}

impl Pool<TcpDialer> {
    /// Dial `size` TCP connections to `addr`
    pub async fn connect(addr: &str, size: usize) -> Result<Self, ClientError> {
        Self::with_dialer(TcpDialer::new(addr), size).await
    }
}

impl<D: Dial> Pool<D> {
    /// Dial `size` connections sequentially.
    ///
    /// If any dial fails, every connection opened so far is closed before
    /// returning; the dial error is reported together with all close errors.
    pub async fn with_dialer(dialer: D, size: usize) -> Result<Self, ClientError> {
        if size == 0 {
            return Err(ClientError::InvalidPoolSize);
        }

        let mut opened = Vec::with_capacity(size);
        for idx in 0..size {
            match dialer.dial().await {
                Ok(stream) => opened.push(Connection::new(stream)),
                Err(source) => {
                    warn!(
                        addr = dialer.target(),
                        idx,
                        size,
                        "Pool dial failed, closing {} opened connection(s)",
                        opened.len()
                    );
                    let dial_error = ClientError::Dial {
                        target: dialer.target().to_string(),
                        source,
                    };
                    let close_errors = close_all(&opened).await;
                    return Err(ClientError::combine(dial_error, close_errors));
                }
            }
        }

        info!(addr = dialer.target(), size, "Connection pool ready");

        Ok(Self {
            dialer,
            size,
            permits: Semaphore::new(size),
            idle: Mutex::new(opened.into_iter().map(Some).collect()),
        })
    }

    /// Number of connections the pool was built with
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of slots not currently checked out
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, ClientError> {
        let checkout = self.checkout().await?;
        checkout.connection()?.get(key).await
    }

    pub async fn set(&self, key: &str, value: &[u8]) -> Result<(), ClientError> {
        let checkout = self.checkout().await?;
        checkout.connection()?.set(key, value).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), ClientError> {
        let checkout = self.checkout().await?;
        checkout.connection()?.delete(key).await
    }

    /// Wait for every checkout to come back, then close all connections
    /// concurrently. Later operations fail with `ClientError::PoolClosed`.
    pub async fn close(&self) -> Result<(), ClientError> {
        let drained = self
            .permits
            .acquire_many(self.size as u32)
            .await
            .map_err(|_| ClientError::PoolClosed)?;
        drained.forget();
        self.permits.close();

        let connections: Vec<_> = self.idle.lock().drain(..).flatten().collect();
        debug!(
            addr = self.dialer.target(),
            "Closing {} pooled connection(s)",
            connections.len()
        );

        match ClientError::aggregate(close_all(&connections).await) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Take a slot, re-dialing it first if its connection was retired
    async fn checkout(&self) -> Result<Checkout<'_, D>, ClientError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ClientError::PoolClosed)?;

        // a permit guarantees an idle slot
        let slot = self.idle.lock().pop().flatten();
        let mut checkout = Checkout {
            pool: self,
            conn: slot,
            _permit: permit,
        };

        if checkout.conn.is_none() {
            debug!(addr = self.dialer.target(), "Re-dialing retired pool slot");
            let stream = self
                .dialer
                .dial()
                .await
                .map_err(|source| ClientError::Dial {
                    target: self.dialer.target().to_string(),
                    source,
                })?;
            checkout.conn = Some(Connection::new(stream));
        }

        Ok(checkout)
    }
}

/// Exclusive loan of one pool slot, returned on drop
struct Checkout<'a, D: Dial> {
    pool: &'a Pool<D>,
    conn: Slot<D::Stream>,
    _permit: SemaphorePermit<'a>,
}

impl<D: Dial> Checkout<'_, D> {
    /// The loaned connection; `checkout` only hands out filled slots
    fn connection(&self) -> Result<&Connection<D::Stream>, ClientError> {
        self.conn.as_ref().ok_or(ClientError::Closed)
    }
}

impl<D: Dial> Drop for Checkout<'_, D> {
    fn drop(&mut self) {
        let mut slot = self.conn.take();
        if slot.as_ref().is_some_and(Connection::is_desynchronized) {
            // dropping the connection closes its socket
            warn!(
                addr = self.pool.dialer.target(),
                "Retiring desynchronized pool connection"
            );
            slot = None;
        }
        // the permit is released after this body runs, so the slot is
        // already back when the next waiter wakes up
        self.pool.idle.lock().push(slot);
    }
}

async fn close_all<S>(connections: &[Connection<S>]) -> Vec<ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    join_all(connections.iter().map(Connection::close))
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect()
}
