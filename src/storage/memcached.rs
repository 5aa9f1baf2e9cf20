//! Remote memcached backend
//!
//! The client is built inside `run`, so a dial failure surfaces as a
//! component failure and aborts startup before the front end is launched.

use crate::StorageError;
use crate::config::MemcachedConfig;
use crate::error::ClientError;
use crate::lifecycle::{Component, Readiness};
use crate::memcache::{CacheClient, Pool};
use crate::storage::Storage;
use anyhow::Context;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Client built from configuration.
///
/// Single-connection mode is a one-slot pool, so a connection that lost its
/// frame alignment is retired and re-dialed on the next call instead of
/// failing every later command.
pub struct MemcachedBackend {
    pool: Pool,
}

impl MemcachedBackend {
    /// Dial according to `config`
    pub async fn connect(config: &MemcachedConfig) -> Result<Self, ClientError> {
        let size = if config.use_pool { config.pool_size } else { 1 };
        Ok(Self {
            pool: Pool::connect(&config.address, size).await?,
        })
    }

    /// Number of connections held
    pub fn size(&self) -> usize {
        self.pool.size()
    }
}

impl CacheClient for MemcachedBackend {
    async fn get(&self, key: &str) -> Result<Bytes, ClientError> {
        self.pool.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), ClientError> {
        self.pool.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), ClientError> {
        self.pool.delete(key).await
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.pool.close().await
    }
}

/// Storage forwarding to a memcached server
pub struct MemcachedStorage<C = MemcachedBackend> {
    config: MemcachedConfig,
    client: OnceCell<C>,
    ready: Readiness,
}

impl MemcachedStorage<MemcachedBackend> {
    pub fn new(config: MemcachedConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
            ready: Readiness::new(),
        }
    }
}

impl<C: CacheClient> MemcachedStorage<C> {
    /// Wrap an already connected client; readiness fires when run
    pub fn with_client(config: MemcachedConfig, client: C) -> Self {
        Self {
            config,
            client: OnceCell::new_with(Some(client)),
            ready: Readiness::new(),
        }
    }

    fn client(&self) -> Result<&C, StorageError> {
        self.client.get().ok_or(StorageError::NotReady)
    }

    async fn shutdown_client(&self) -> anyhow::Result<()> {
        if let Some(client) = self.client.get() {
            client
                .close()
                .await
                .context("failed to close memcached client")?;
        }
        Ok(())
    }
}

impl<C: CacheClient + 'static> Storage for MemcachedStorage<C> {
    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.client()?
            .get(key)
            .await
            .map_err(StorageError::client("get"))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StorageError> {
        self.client()?
            .set(key, &value)
            .await
            .map_err(StorageError::client("set"))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client()?
            .delete(key)
            .await
            .map_err(StorageError::client("delete"))
    }
}

impl Component for MemcachedStorage<MemcachedBackend> {
    fn name(&self) -> &str {
        "memcached-storage"
    }

    fn readiness(&self) -> Readiness {
        self.ready.clone()
    }

    fn run(self: Arc<Self>, shutdown: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            let config = &self.config;
            self.client
                .get_or_try_init(|| MemcachedBackend::connect(config))
                .await
                .context("failed to create memcached client")?;

            info!(
                address = %config.address,
                pool = config.use_pool,
                pool_size = config.pool_size,
                "Connected to memcached"
            );
            self.ready.set();

            shutdown.cancelled().await;
            self.shutdown_client().await?;
            info!("Memcached storage stopped");
            Ok(())
        })
    }
}
