//! In-process map backend

use crate::StorageError;
use crate::lifecycle::{Component, Readiness};
use crate::storage::Storage;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// HashMap-backed storage; lives and dies with the process
#[derive(Default)]
pub struct MemoryStorage {
    map: RwLock<HashMap<String, Bytes>>,
    ready: Readiness,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.map.read().get(key).cloned().ok_or(StorageError::NotFound)
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StorageError> {
        self.map.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self.map.write().remove(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound),
        }
    }
}

impl Component for MemoryStorage {
    fn name(&self) -> &str {
        "inmemory-storage"
    }

    fn readiness(&self) -> Readiness {
        self.ready.clone()
    }

    fn run(self: Arc<Self>, shutdown: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            self.ready.set();
            shutdown.cancelled().await;
            info!(keys = self.len(), "In-memory storage stopped");
            Ok(())
        })
    }
}
