//! Admission controller: capacity check, ticket issue, enqueue.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::admission::dispatcher::{Dispatcher, Turn};
use crate::observability::metrics;
use crate::queue::{OrderedQueueStore, StoreResult, TicketIssuer};

/// Result of an admission attempt.
#[derive(Debug)]
pub enum Admission {
    /// Ticket pushed; wait on the turn.
    Queued(Turn),
    /// Queue was at capacity when checked. No ticket exists.
    Rejected { depth: u64, capacity: u64 },
}

pub struct AdmissionController {
    store: Arc<dyn OrderedQueueStore>,
    key: String,
    capacity: AtomicU64,
    issuer: TicketIssuer,
    dispatcher: Arc<Dispatcher>,
}

impl AdmissionController {
    pub fn new(
        store: Arc<dyn OrderedQueueStore>,
        key: impl Into<String>,
        capacity: u64,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            capacity: AtomicU64::new(capacity),
            issuer: TicketIssuer::new(),
            dispatcher,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Change the limit applied to later admission checks.
    pub fn set_capacity(&self, capacity: u64) {
        self.capacity.store(capacity, Ordering::Relaxed);
    }

    pub fn instance_id(&self) -> &str {
        self.issuer.instance_id()
    }

    /// Count the attempt, then queue the peer unless the queue is full.
    ///
    /// The depth read and the push are separate store commands, so a burst
    /// of concurrent arrivals can overshoot capacity slightly.
    pub async fn admit(&self, peer: SocketAddr) -> StoreResult<Admission> {
        metrics::record_login_attempt();

        let depth = self.store.len(&self.key).await?;
        metrics::set_queue_depth(depth);

        let capacity = self.capacity();
        if depth >= capacity {
            metrics::record_rejected("capacity");
            return Ok(Admission::Rejected { depth, capacity });
        }

        let ticket = self.issuer.issue(peer);
        let turn = self.dispatcher.register(ticket.clone());
        if let Err(e) = self.store.push_head(&self.key, ticket.as_str()).await {
            turn.cancel_unqueued();
            return Err(e);
        }

        tracing::debug!(ticket = %ticket, depth = depth + 1, "Enqueued");
        Ok(Admission::Queued(turn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::dispatcher::DispatchTiming;
    use crate::queue::{InMemoryQueueStore, StoreError};
    use async_trait::async_trait;

    const KEY: &str = "login_queue";

    fn setup(store: Arc<dyn OrderedQueueStore>, capacity: u64) -> (AdmissionController, Arc<Dispatcher>) {
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), KEY, DispatchTiming::default()));
        (
            AdmissionController::new(store, KEY, capacity, dispatcher.clone()),
            dispatcher,
        )
    }

    fn peer() -> SocketAddr {
        "203.0.113.7:51000".parse().unwrap()
    }

    #[tokio::test]
    async fn full_queue_rejects_without_ticket() {
        let store = Arc::new(InMemoryQueueStore::new());
        store.push_head(KEY, "a").await.unwrap();
        store.push_head(KEY, "b").await.unwrap();
        let (controller, dispatcher) = setup(store.clone(), 2);

        let admission = controller.admit(peer()).await.unwrap();
        assert!(matches!(
            admission,
            Admission::Rejected { depth: 2, capacity: 2 }
        ));
        assert_eq!(store.snapshot(KEY), vec!["a", "b"]);
        assert_eq!(dispatcher.waiting(), 0);
    }

    #[tokio::test]
    async fn admitted_peer_is_pushed_at_enqueue_end() {
        let store = Arc::new(InMemoryQueueStore::new());
        store.push_head(KEY, "earlier").await.unwrap();
        let (controller, dispatcher) = setup(store.clone(), 2);

        let Admission::Queued(turn) = controller.admit(peer()).await.unwrap() else {
            panic!("expected to be queued");
        };

        assert_eq!(
            store.snapshot(KEY),
            vec!["earlier".to_string(), turn.ticket().to_string()]
        );
        assert!(turn.ticket().as_str().starts_with("203.0.113.7:51000#"));
        assert_eq!(dispatcher.waiting(), 1);

        assert!(turn.release().await);
        assert_eq!(store.snapshot(KEY), vec!["earlier"]);
    }

    #[tokio::test]
    async fn capacity_can_be_changed_live() {
        let store = Arc::new(InMemoryQueueStore::new());
        store.push_head(KEY, "a").await.unwrap();
        let (controller, _dispatcher) = setup(store.clone(), 1);

        assert!(matches!(
            controller.admit(peer()).await.unwrap(),
            Admission::Rejected { .. }
        ));

        controller.set_capacity(5);
        let admission = controller.admit(peer()).await.unwrap();
        assert!(matches!(admission, Admission::Queued(_)));
        if let Admission::Queued(turn) = admission {
            turn.release().await;
        }
    }

    /// Store whose writes always fail.
    #[derive(Debug, Default)]
    struct ReadOnlyStore(InMemoryQueueStore);

    #[async_trait]
    impl OrderedQueueStore for ReadOnlyStore {
        async fn push_head(&self, _key: &str, _value: &str) -> StoreResult<u64> {
            Err(StoreError::Unavailable("read-only replica".into()))
        }
        async fn pop_tail(&self, key: &str) -> StoreResult<Option<String>> {
            self.0.pop_tail(key).await
        }
        async fn push_tail(&self, _key: &str, _value: &str) -> StoreResult<u64> {
            Err(StoreError::Unavailable("read-only replica".into()))
        }
        async fn len(&self, key: &str) -> StoreResult<u64> {
            self.0.len(key).await
        }
        async fn remove(&self, key: &str, value: &str) -> StoreResult<u64> {
            self.0.remove(key, value).await
        }
    }

    #[tokio::test]
    async fn failed_push_leaves_no_waiter_behind() {
        let store = Arc::new(ReadOnlyStore::default());
        let (controller, dispatcher) = setup(store, 10);

        let result = controller.admit(peer()).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(dispatcher.waiting(), 0);
    }
}
