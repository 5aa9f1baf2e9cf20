//! # kvgate
//!
//! Memcached-compatible key-value gateway. Clients speak the memcached text
//! protocol to kvgate, which answers from an in-process map or forwards to a
//! remote memcached through a pooled async client.
//!
//! ## Features
//!
//! - Memcached ASCII protocol front end (GET, SET, DELETE, VERSION)
//! - Async memcached client: single connection or bounded pool
//! - Ordered component startup with reverse-order, sequential teardown
//! - Error classification at the request boundary (not found, unknown, internal)
//! - Prometheus metrics and health check endpoints
//!
//! ## Example
//!
//! ```ignore
//! use kvgate::memcache::{CacheClient, Pool};
//!
//! let pool = Pool::connect("127.0.0.1:11211", 4).await?;
//! pool.set("greeting", b"hello").await?;
//! let value = pool.get("greeting").await?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────────┐     ┌───────────┐
//! │ app/service  │────▶│ kvgate                   │────▶│ memcached │
//! │ (memcache    │     │  ├─ ASCII protocol       │     │           │
//! │  client)     │     │  ├─ storage capability   │     └───────────┘
//! └──────────────┘     │  └─ connection pool      │
//!                      └──────────────────────────┘
//! ```

// Modules
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod memcache;
pub mod metrics;
pub mod prelude;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use error::{
    ClientError, ErrorKind, GatewayError, LifecycleError, ProtocolError, Result, StorageError,
    classify,
};
