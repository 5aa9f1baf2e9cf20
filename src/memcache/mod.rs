//! Memcached ASCII client: wire codec, single connection and connection pool

pub mod codec;
pub mod connection;
pub mod pool;

pub use codec::{MAX_KEY_SIZE, MAX_VALUE_SIZE};
pub use connection::Connection;
pub use pool::{Dial, Pool, TcpDialer};

use crate::error::ClientError;
use bytes::Bytes;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};

/// Operations shared by a single connection and a pool, so either can back
/// a storage without the caller noticing the difference.
pub trait CacheClient: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Bytes, ClientError>> + Send;

    fn set(&self, key: &str, value: &[u8]) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn close(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

impl<S> CacheClient for Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn get(&self, key: &str) -> impl Future<Output = Result<Bytes, ClientError>> + Send {
        Connection::get(self, key)
    }

    fn set(&self, key: &str, value: &[u8]) -> impl Future<Output = Result<(), ClientError>> + Send {
        Connection::set(self, key, value)
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), ClientError>> + Send {
        Connection::delete(self, key)
    }

    fn close(&self) -> impl Future<Output = Result<(), ClientError>> + Send {
        Connection::close(self)
    }
}

impl<D: Dial> CacheClient for Pool<D> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Bytes, ClientError>> + Send {
        Pool::get(self, key)
    }

    fn set(&self, key: &str, value: &[u8]) -> impl Future<Output = Result<(), ClientError>> + Send {
        Pool::set(self, key, value)
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), ClientError>> + Send {
        Pool::delete(self, key)
    }

    fn close(&self) -> impl Future<Output = Result<(), ClientError>> + Send {
        Pool::close(self)
    }
}
