//! End-to-end: memcache client -> kvgate (memcached mode) -> kvgate (in-memory)

use kvgate::config::{MemcachedConfig, ServerConfig};
use kvgate::lifecycle::{Component, Orchestrator, RunState};
use kvgate::memcache::{CacheClient, Connection, Pool};
use kvgate::metrics::Metrics;
use kvgate::server::Server;
use kvgate::storage::{MemcachedStorage, MemoryStorage, Storage};
use kvgate::{ClientError, ErrorKind, classify};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

struct Gateway {
    addr: SocketAddr,
    shutdown: CancellationToken,
    run: JoinHandle<Result<(), kvgate::LifecycleError>>,
}

impl Gateway {
    async fn start<S: Storage + Component>(storage: Arc<S>) -> Self {
        let config = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        };
        let server = Arc::new(Server::new(
            config,
            Arc::clone(&storage),
            Arc::new(Metrics::new().unwrap()),
        ));

        let orchestrator = Orchestrator::new(vec![
            storage as Arc<dyn Component>,
            Arc::clone(&server) as Arc<dyn Component>,
        ]);
        let ready = orchestrator.readiness();
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(orchestrator.run(shutdown.clone()));
        timeout(Duration::from_secs(2), ready.wait()).await.unwrap();

        Self {
            addr: server.local_addr().unwrap(),
            shutdown,
            run,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        timeout(Duration::from_secs(2), self.run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

async fn exercise<C: CacheClient>(client: &C) {
    client.set("greeting", b"hello").await.unwrap();
    assert_eq!(client.get("greeting").await.unwrap().as_ref(), b"hello");

    client.set("empty", b"").await.unwrap();
    assert!(client.get("empty").await.unwrap().is_empty());

    let binary = [0u8, 13, 10, 255, 13, 10, 69, 78, 68];
    client.set("binary", &binary).await.unwrap();
    assert_eq!(client.get("binary").await.unwrap().as_ref(), &binary[..]);

    client.delete("greeting").await.unwrap();
    let miss = client.get("greeting").await.unwrap_err();
    assert!(matches!(miss, ClientError::NotFound));
    assert_eq!(classify(&miss), ErrorKind::NotFound);

    let again = client.delete("greeting").await.unwrap_err();
    assert_eq!(classify(&again), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_pool_against_in_memory_gateway() {
    let gateway = Gateway::start(Arc::new(MemoryStorage::new())).await;

    let pool = Pool::connect(&gateway.addr.to_string(), 2).await.unwrap();
    exercise(&pool).await;

    // concurrent callers share the two connections
    let pool = Arc::new(pool);
    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let key = format!("key-{i}");
                pool.set(&key, key.as_bytes()).await.unwrap();
                assert_eq!(pool.get(&key).await.unwrap().as_ref(), key.as_bytes());
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(pool.available(), 2);

    pool.close().await.unwrap();
    assert!(matches!(
        pool.get("key-1").await,
        Err(ClientError::PoolClosed)
    ));

    gateway.stop().await;
}

#[tokio::test]
async fn test_gateway_forwarding_to_memcached() {
    let backend = Gateway::start(Arc::new(MemoryStorage::new())).await;

    let forwarding = Arc::new(MemcachedStorage::new(MemcachedConfig {
        address: backend.addr.to_string(),
        use_pool: true,
        pool_size: 2,
    }));
    let front = Gateway::start(forwarding).await;

    let conn = Connection::connect(&front.addr.to_string()).await.unwrap();
    exercise(&conn).await;
    conn.close().await.unwrap();

    // front end first, it holds client connections into the backend
    front.stop().await;
    backend.stop().await;
}

#[tokio::test]
async fn test_unreachable_memcached_aborts_startup() {
    let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = unused.local_addr().unwrap();
    drop(unused);

    let storage = Arc::new(MemcachedStorage::new(MemcachedConfig {
        address: addr.to_string(),
        use_pool: false,
        pool_size: 1,
    }));
    let server = Arc::new(Server::new(
        ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        },
        Arc::clone(&storage),
        Arc::new(Metrics::new().unwrap()),
    ));

    let orchestrator = Orchestrator::new(vec![
        storage as Arc<dyn Component>,
        Arc::clone(&server) as Arc<dyn Component>,
    ]);
    let mut state = orchestrator.subscribe();

    let err = timeout(
        Duration::from_secs(2),
        orchestrator.run(CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap_err();

    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].name, "memcached-storage");
    assert!(format!("{:#}", err.failures[0].error).contains("failed to create memcached client"));
    // the front end never started listening
    assert!(server.local_addr().is_none());
    assert_eq!(*state.borrow_and_update(), RunState::Stopped);
}
