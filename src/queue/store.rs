//! The ordered store every gateway instance queues against.
//!
//! Tickets enter at the head and leave from the tail, so the tail is always
//! the oldest waiting ticket. Each primitive is atomic on its own; sequences
//! of them (check length then push, pop then push back) are not.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

/// Errors that can occur talking to the queue store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis command or connection failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Store refused service for another reason.
    #[error("queue store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// List-like store with atomic single-item operations.
#[async_trait]
pub trait OrderedQueueStore: Send + Sync + std::fmt::Debug {
    /// Insert at the enqueue end. Returns the new length.
    async fn push_head(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Atomically remove the oldest item, if any.
    async fn pop_tail(&self, key: &str) -> StoreResult<Option<String>>;

    /// Put an item back at the dequeue end. Returns the new length.
    async fn push_tail(&self, key: &str, value: &str) -> StoreResult<u64>;

    async fn len(&self, key: &str) -> StoreResult<u64>;

    /// Delete every occurrence of `value`. Returns how many were removed.
    async fn remove(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Check the store is reachable.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Mutation counter for stores that can signal changes made in this
    /// process. Stores shared across processes return `None` and are polled.
    fn changes(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}
