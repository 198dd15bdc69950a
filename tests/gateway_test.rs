//! End-to-end admission and relay through a running gateway.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use login_gateway::queue::{InMemoryQueueStore, OrderedQueueStore};

mod common;

use common::KEY;

#[tokio::test]
async fn single_client_is_admitted_and_relayed() {
    let backend = common::start_greeting_backend("HELLO\n").await;
    let store = Arc::new(InMemoryQueueStore::new());
    let gateway = common::start_gateway(common::test_config(backend), store.clone()).await;

    let mut client = gateway.connect().await;
    let mut greeting = [0u8; 6];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut greeting))
        .await
        .expect("no greeting")
        .unwrap();
    assert_eq!(&greeting, b"HELLO\n");

    client.write_all(b"LOGIN user").await.unwrap();
    let mut echoed = [0u8; 10];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"LOGIN user");
    assert_eq!(store.len(KEY).await.unwrap(), 0);

    drop(client);
    gateway.stop().await;
}

#[tokio::test]
async fn bytes_sent_while_queued_reach_backend_first() {
    let (backend, mut received) = common::start_recording_backend().await;
    let store = Arc::new(InMemoryQueueStore::new());
    // A foreign ticket at the head holds everyone back until it is evicted.
    store.push_head(KEY, "crashed-instance#7").await.unwrap();
    let mut config = common::test_config(backend);
    config.queue.orphan_timeout_secs = 1;
    let gateway = common::start_gateway(config, store.clone()).await;

    let mut client = gateway.connect().await;
    common::wait_for_len(store.as_ref(), 2).await;
    client.write_all(b"EARLY").await.unwrap();

    let mut collected = Vec::new();
    while collected.len() < 5 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .expect("backend received nothing")
            .unwrap();
        collected.extend_from_slice(&chunk);
    }
    assert_eq!(collected, b"EARLY");

    client.write_all(b"LATE").await.unwrap();
    let chunk = received.recv().await.unwrap();
    assert_eq!(chunk, b"LATE");

    drop(client);
    gateway.stop().await;
}

#[tokio::test]
async fn capacity_reload_applies_to_next_client() {
    let backend = common::start_echo_backend().await;
    let store = Arc::new(common::FrozenStore::default());
    let config = common::test_config(backend);
    let listener = login_gateway::net::Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = login_gateway::GatewayServer::new(config.clone(), store.clone());
    let shutdown = Arc::new(login_gateway::Shutdown::new());
    let (updates_tx, updates) = tokio::sync::mpsc::unbounded_channel();
    let handle = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move { server.run(listener, updates, &shutdown).await })
    };

    let _first = tokio::net::TcpStream::connect(addr).await.unwrap();
    common::wait_for_len(store.as_ref(), 1).await;

    let mut reloaded = config;
    reloaded.queue.capacity = 1;
    updates_tx.send(reloaded).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut second = tokio::net::TcpStream::connect(addr).await.unwrap();
    assert_eq!(
        common::read_all(&mut second).await,
        login_gateway::gateway::response::SERVER_FULL
    );

    shutdown.trigger();
    handle.await.unwrap();
}
