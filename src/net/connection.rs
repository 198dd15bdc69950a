//! Client connections and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Detect a client hanging up while it waits in the queue
//! - Hold bytes the client sends before admission
//! - Count open connections for graceful shutdown

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why [`ClientConnection::closed`] resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    HungUp,
    /// The client sent more than `max_early_bytes` while queued.
    EarlyDataLimit,
}

/// A client socket owned by its handler from accept until close.
#[derive(Debug)]
pub struct ClientConnection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
    early: Vec<u8>,
    max_early_bytes: usize,
}

impl ClientConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr, id: ConnectionId, max_early_bytes: usize) -> Self {
        Self {
            id,
            peer,
            stream,
            early: Vec::new(),
            max_early_bytes,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Bytes received so far that still have to reach the backend.
    pub fn early_bytes(&self) -> &[u8] {
        &self.early
    }

    /// Resolve when a queued client stops being a valid waiter: it hung up,
    /// or it sent more than `max_early_bytes` before admission. Socket
    /// failures come back as `Err`.
    ///
    /// Bytes within the limit are kept for the backend. Cancel safe.
    pub async fn closed(&mut self) -> std::io::Result<Departure> {
        let mut chunk = [0u8; 4096];
        loop {
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(Departure::HungUp);
            }
            if self.early.len() + n > self.max_early_bytes {
                return Ok(Departure::EarlyDataLimit);
            }
            self.early.extend_from_slice(&chunk[..n]);
        }
    }

    /// Write a one-line notice and close the connection.
    pub async fn reject(mut self, line: &str) {
        let result = async {
            self.stream.write_all(line.as_bytes()).await?;
            self.stream.shutdown().await
        }
        .await;
        if let Err(e) = result {
            tracing::debug!(connection_id = %self.id, error = %e, "Client gone before notice was sent");
        }
    }

    /// Hand over the socket and the bytes received before admission.
    pub fn into_parts(self) -> (TcpStream, Vec<u8>) {
        (self.stream, self.early)
    }
}

/// Tracks open client connections for graceful shutdown.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<u64>>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a new connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active.send_modify(|count| *count += 1);
        metrics::set_active_connections(self.active_count());
        ConnectionGuard {
            active: Arc::clone(&self.active),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until every connection has closed. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.active.subscribe();
        let idle = tokio::time::timeout(timeout, rx.wait_for(|count| *count == 0))
            .await
            .is_ok();
        idle
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<watch::Sender<u64>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count = count.saturating_sub(1));
        metrics::set_active_connections(*self.active.borrow());
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair(max_early_bytes: usize) -> (ClientConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (
            ClientConnection::new(server, peer, ConnectionId::new(), max_early_bytes),
            client,
        )
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_times_out_while_connections_open() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();
        assert!(!tracker.wait_idle(Duration::from_millis(20)).await);

        let waiter = tracker.clone();
        let handle = tokio::spawn(async move { waiter.wait_idle(Duration::from_secs(1)).await });
        drop(guard);
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn hangup_is_detected_and_early_bytes_kept() {
        let (mut conn, mut client) = pair(1024).await;
        client.write_all(b"HELLO").await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let departure = tokio::time::timeout(Duration::from_secs(1), conn.closed())
            .await
            .expect("hangup not detected")
            .unwrap();
        assert_eq!(departure, Departure::HungUp);
        assert_eq!(conn.early_bytes(), b"HELLO");
    }

    #[tokio::test]
    async fn bytes_within_limit_keep_waiting() {
        let (mut conn, mut client) = pair(8).await;
        client.write_all(b"ABCDEFGH").await.unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(100), conn.closed()).await;
        assert!(waited.is_err());
        assert_eq!(conn.early_bytes(), b"ABCDEFGH");

        let (_stream, early) = conn.into_parts();
        assert_eq!(early, b"ABCDEFGH");
    }

    #[tokio::test]
    async fn exceeding_early_limit_ends_wait_even_after_hangup() {
        let (mut conn, mut client) = pair(4).await;
        client.write_all(b"ABCDEFGH").await.unwrap();
        drop(client);

        let departure = tokio::time::timeout(Duration::from_secs(2), conn.closed())
            .await
            .expect("overflowing client never released")
            .unwrap();
        assert_eq!(departure, Departure::EarlyDataLimit);
        assert!(conn.early_bytes().len() <= 4);
    }

    #[tokio::test]
    async fn reject_sends_line_then_closes() {
        let (conn, mut client) = pair(1024).await;
        conn.reject("Server is full. Try again later.\n").await;

        let mut received = String::new();
        client.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "Server is full. Try again later.\n");
    }
}
