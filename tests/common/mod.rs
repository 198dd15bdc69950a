//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use login_gateway::config::{GatewayConfig, StoreKind};
use login_gateway::lifecycle::Shutdown;
use login_gateway::net::Listener;
use login_gateway::queue::{InMemoryQueueStore, OrderedQueueStore, StoreResult};
use login_gateway::GatewayServer;

pub const KEY: &str = "login_queue";

/// Start a backend that echoes every byte back. Returns its address.
pub async fn start_echo_backend() -> SocketAddr {
    start_backend(|mut socket| async move {
        let (mut read, mut write) = socket.split();
        let _ = tokio::io::copy(&mut read, &mut write).await;
    })
    .await
}

/// Start a backend that sends `greeting`, then echoes.
pub async fn start_greeting_backend(greeting: &'static str) -> SocketAddr {
    start_backend(move |mut socket| async move {
        if socket.write_all(greeting.as_bytes()).await.is_err() {
            return;
        }
        let (mut read, mut write) = socket.split();
        let _ = tokio::io::copy(&mut read, &mut write).await;
    })
    .await
}

/// Start a backend that closes every connection right after accepting it.
pub async fn start_closing_backend() -> SocketAddr {
    start_backend(|socket| async move {
        drop(socket);
    })
    .await
}

/// Start a backend that forwards everything it receives to the returned
/// channel, then reports EOF with an empty chunk.
pub async fn start_recording_backend() -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let addr = start_backend(move |mut socket| {
        let tx = tx.clone();
        async move {
            let mut buf = [0u8; 4096];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => {
                        let _ = tx.send(Vec::new());
                        return;
                    }
                    Ok(n) => {
                        let _ = tx.send(buf[..n].to_vec());
                    }
                }
            }
        }
    })
    .await;
    (addr, rx)
}

async fn start_backend<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(handler(socket));
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Delegates to an in-memory store but never hands out the head, so every
/// ticket stays queued.
#[derive(Debug, Default)]
pub struct FrozenStore {
    pub inner: InMemoryQueueStore,
}

#[async_trait]
impl OrderedQueueStore for FrozenStore {
    async fn push_head(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.inner.push_head(key, value).await
    }
    async fn pop_tail(&self, _key: &str) -> StoreResult<Option<String>> {
        Ok(None)
    }
    async fn push_tail(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.inner.push_tail(key, value).await
    }
    async fn len(&self, key: &str) -> StoreResult<u64> {
        self.inner.len(key).await
    }
    async fn remove(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.inner.remove(key, value).await
    }
    fn changes(&self) -> Option<watch::Receiver<u64>> {
        self.inner.changes()
    }
}

/// Config for a gateway on an ephemeral port with an in-memory store.
pub fn test_config(backend: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backend.address = backend.to_string();
    config.backend.connect_timeout_secs = 1;
    config.queue.store = StoreKind::Memory;
    config.queue.idle_poll_ms = 10;
    config.queue.requeue_backoff_ms = 10;
    config.observability.metrics_enabled = false;
    config.shutdown.drain_timeout_secs = 1;
    config
}

/// A running gateway. Shuts down when dropped.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Arc<Shutdown>,
    pub handle: Option<JoinHandle<()>>,
}

impl TestGateway {
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    pub async fn stop(mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("gateway did not stop")
                .unwrap();
        }
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: GatewayConfig, store: Arc<dyn OrderedQueueStore>) -> TestGateway {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = GatewayServer::new(config, store);
    let shutdown = Arc::new(Shutdown::new());
    let (updates_tx, updates) = mpsc::unbounded_channel();

    let handle = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let _updates_tx = updates_tx;
            server.run(listener, updates, &shutdown).await;
        })
    };

    TestGateway {
        addr,
        shutdown,
        handle: Some(handle),
    }
}

/// Read until the peer closes, within a deadline.
pub async fn read_all(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("peer did not close")
        .unwrap_or_default();
    String::from_utf8_lossy(&buf).into_owned()
}

/// Poll `store.len` until it equals `expected`.
pub async fn wait_for_len(store: &dyn OrderedQueueStore, expected: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.len(KEY).await.unwrap() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("queue never reached length {expected}"));
}
