//! Storage backends served by the front end

mod memcached;
mod memory;

pub use memcached::{MemcachedBackend, MemcachedStorage};
pub use memory::MemoryStorage;

use crate::StorageError;
use bytes::Bytes;
use std::future::Future;

/// Key-value capability the front-end server is built on
pub trait Storage: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Bytes, StorageError>> + Send;

    fn set(&self, key: &str, value: Bytes)
    -> impl Future<Output = Result<(), StorageError>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}
