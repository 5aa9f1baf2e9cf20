//! Configuration for kvgate

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logger: LoggerConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Default level filter (`RUST_LOG` takes precedence)
    pub level: String,

    /// Human-oriented colored output instead of plain text
    pub console: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: false,
        }
    }
}

/// Front-end server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen_addr: String,

    /// Maximum number of concurrent client connections
    pub max_connections: usize,

    /// Read buffer size per connection (bytes)
    pub read_buffer_size: usize,

    /// Write buffer size per connection (bytes)
    pub write_buffer_size: usize,

    /// Number of Tokio worker threads (0 = number of CPUs)
    pub worker_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:11311".to_string(),
            max_connections: 10000,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            worker_threads: 0,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Forward to memcached instead of keeping values in process
    pub use_memcached: bool,

    pub memcached: MemcachedConfig,
}

/// Remote memcached client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemcachedConfig {
    /// Address of the memcached server
    pub address: String,

    /// Use a connection pool instead of a single connection
    pub use_pool: bool,

    /// Number of pooled connections
    pub pool_size: usize,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:11211".to_string(),
            use_pool: true,
            pool_size: 8,
        }
    }
}

/// Metrics and health check configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the metrics/health HTTP endpoint
    pub enabled: bool,

    /// Address for metrics/health HTTP server
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::GatewayError::Config(format!("Failed to read config file: {e}"))
        })?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| crate::GatewayError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("KVGATE_LOG_LEVEL") {
            config.logger.level = level;
        }

        if let Ok(console) = std::env::var("KVGATE_LOG_CONSOLE") {
            config.logger.console = parse_bool(&console);
        }

        if let Ok(addr) = std::env::var("KVGATE_LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(max_conn) = std::env::var("KVGATE_MAX_CONNECTIONS")
            && let Ok(n) = max_conn.parse()
        {
            config.server.max_connections = n;
        }

        if let Ok(enabled) = std::env::var("KVGATE_USE_MEMCACHED") {
            config.storage.use_memcached = parse_bool(&enabled);
        }

        if let Ok(addr) = std::env::var("KVGATE_MEMCACHED_ADDR") {
            config.storage.memcached.address = addr;
        }

        if let Ok(enabled) = std::env::var("KVGATE_MEMCACHED_USE_POOL") {
            config.storage.memcached.use_pool = parse_bool(&enabled);
        }

        if let Ok(size) = std::env::var("KVGATE_MEMCACHED_POOL_SIZE")
            && let Ok(n) = size.parse()
        {
            config.storage.memcached.pool_size = n;
        }

        if let Ok(addr) = std::env::var("KVGATE_METRICS_ADDR") {
            config.metrics.listen_addr = addr;
        }

        if let Ok(enabled) = std::env::var("KVGATE_METRICS_ENABLED") {
            config.metrics.enabled = parse_bool(&enabled);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.listen_addr.is_empty() {
            return Err(crate::GatewayError::Config(
                "server.listen_addr must not be empty".to_string(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(crate::GatewayError::Config(
                "server.max_connections must be at least 1".to_string(),
            ));
        }

        if self.storage.use_memcached {
            let memcached = &self.storage.memcached;
            if memcached.address.is_empty() {
                return Err(crate::GatewayError::Config(
                    "storage.memcached.address must not be empty".to_string(),
                ));
            }
            if memcached.use_pool && memcached.pool_size == 0 {
                return Err(crate::GatewayError::Config(
                    "storage.memcached.pool_size must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.storage.use_memcached);
        assert!(config.storage.memcached.use_pool);
        assert_eq!(config.storage.memcached.pool_size, 8);
        assert_eq!(config.logger.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [logger]
            level = "debug"

            [storage]
            use_memcached = true

            [storage.memcached]
            address = "10.0.0.5:11211"
            pool_size = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.logger.level, "debug");
        assert!(!config.logger.console);
        assert!(config.storage.use_memcached);
        assert_eq!(config.storage.memcached.address, "10.0.0.5:11211");
        assert_eq!(config.storage.memcached.pool_size, 3);
        assert!(config.storage.memcached.use_pool);
        assert_eq!(config.server.listen_addr, "127.0.0.1:11311");
    }

    #[test]
    fn test_rejects_empty_pool() {
        let err = Config::from_toml(
            r#"
            [storage]
            use_memcached = true
            [storage.memcached]
            use_pool = true
            pool_size = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("pool_size"));

        // irrelevant when the single-connection client is used
        assert!(
            Config::from_toml(
                r#"
                [storage]
                use_memcached = true
                [storage.memcached]
                use_pool = false
                pool_size = 0
                "#,
            )
            .is_ok()
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nlisten_addr = \"0.0.0.0:5000\"").unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:5000");

        assert!(Config::from_file("/nonexistent/kvgate.toml").is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[server\nlisten_addr = 1").unwrap_err();
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("no"));
    }
}
