//! Prelude module for common imports.
//!
//! # Usage
//!
//! ```ignore
//! use kvgate::prelude::*;
//! ```

// Error types
pub use crate::error::{
    ClientError, ErrorKind, GatewayError, ProtocolError, Result, StorageError, classify,
};

// Configuration
pub use crate::config::{Config, MemcachedConfig, MetricsConfig, ServerConfig, StorageConfig};

// Lifecycle
pub use crate::lifecycle::{Component, Orchestrator, Readiness, RunState};

// Client
pub use crate::memcache::{CacheClient, Connection, Pool};

// Storage
pub use crate::storage::{MemcachedStorage, MemoryStorage, Storage};

// Metrics
pub use crate::metrics::Metrics;

// Server
pub use crate::server::Server;

// Common external crates
pub use std::sync::Arc;
pub use tracing::{debug, error, info, trace, warn};
