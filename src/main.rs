//! kvgate - memcached-compatible key-value gateway
//!
//! Serves the memcached ASCII protocol from an in-process map or forwards
//! to a remote memcached.

// Use jemalloc for better multi-threaded performance
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use kvgate::config::{Config, LoggerConfig};
use kvgate::health::HealthServer;
use kvgate::lifecycle::{Component, Orchestrator};
use kvgate::metrics::Metrics;
use kvgate::server::Server;
use kvgate::storage::{MemcachedStorage, MemoryStorage, Storage};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<ExitCode> {
    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(config_path) => Config::from_file(&config_path)?,
        None => Config::from_env()?,
    };

    init_tracing(&config.logger);
    info!("Starting kvgate");
    info!("Configuration: {:?}", config);

    // Build tokio runtime with configured worker threads
    let mut runtime_builder = Builder::new_multi_thread();
    if config.server.worker_threads > 0 {
        runtime_builder.worker_threads(config.server.worker_threads);
        info!("Using {} worker threads", config.server.worker_threads);
    } else {
        info!("Using default worker threads (auto-detected)");
    }
    let runtime = runtime_builder.enable_all().build()?;

    runtime.block_on(async_main(config))
}

fn init_tracing(logger: &LoggerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logger.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(logger.console)
        .with_writer(std::io::stderr)
        .init();
}

async fn async_main(config: Config) -> anyhow::Result<ExitCode> {
    let metrics = Arc::new(Metrics::new()?);

    let mut orchestrator = Orchestrator::new(Vec::new());

    if config.metrics.enabled {
        orchestrator.push(Arc::new(HealthServer::new(
            config.metrics.clone(),
            Arc::clone(&metrics),
            orchestrator.subscribe(),
        )));
    }

    if config.storage.use_memcached {
        info!(
            "Forwarding to memcached at {} (pool: {})",
            config.storage.memcached.address, config.storage.memcached.use_pool
        );
        let storage = Arc::new(MemcachedStorage::new(config.storage.memcached.clone()));
        add_storage(&mut orchestrator, &config, storage, &metrics);
    } else {
        info!("Using in-memory storage");
        let storage = Arc::new(MemoryStorage::new());
        add_storage(&mut orchestrator, &config, storage, &metrics);
    }

    // Create cancellation token for graceful shutdown
    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    match orchestrator.run(shutdown).await {
        Ok(()) => {
            info!("kvgate stopped");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("kvgate stopped with errors: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// The storage starts first, the front end last
fn add_storage<S: Storage + Component>(
    orchestrator: &mut Orchestrator,
    config: &Config,
    storage: Arc<S>,
    metrics: &Arc<Metrics>,
) {
    let server = Server::new(
        config.server.clone(),
        Arc::clone(&storage),
        Arc::clone(metrics),
    );
    orchestrator.push(storage);
    orchestrator.push(Arc::new(server));
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Received SIGINT, shutting down..."),
            Err(e) => {
                warn!("Failed to listen for SIGINT: {}", e);
                return;
            }
        },
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
    shutdown.cancel();
}
