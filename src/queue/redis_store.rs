//! Redis-backed queue store shared by every gateway instance.
//!
//! Maps the store primitives onto list commands: LPUSH, RPOP, RPUSH, LLEN
//! and LREM. The connection manager reconnects on its own after a dropped
//! connection, so steady-state failures surface as transient errors.

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use std::time::Duration;

use crate::queue::store::{OrderedQueueStore, StoreError, StoreResult};

/// Per-attempt dial timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Reconnect attempts before a command fails.
const CONNECT_RETRIES: usize = 2;

/// Hard bound on connecting plus the initial PING.
const STARTUP_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RedisQueueStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueueStore").finish_non_exhaustive()
    }
}

impl RedisQueueStore {
    /// Open a managed connection and verify the server answers.
    ///
    /// Fails within a few seconds when the server is unreachable.
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(CONNECT_RETRIES)
            .set_connection_timeout(CONNECT_TIMEOUT);

        let connect = async {
            let conn = ConnectionManager::new_with_config(client, config).await?;
            let store = Self { conn };
            store.ping().await?;
            Ok::<_, StoreError>(store)
        };

        tokio::time::timeout(STARTUP_DEADLINE, connect)
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!(
                    "no answer from redis within {}s",
                    STARTUP_DEADLINE.as_secs()
                ))
            })?
    }

    /// Delete the whole queue. Operator recovery only.
    pub async fn purge(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed)
    }
}

#[async_trait]
impl OrderedQueueStore for RedisQueueStore {
    async fn push_head(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.lpush(key, value).await?;
        Ok(len)
    }

    async fn pop_tail(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.rpop(key, None).await?;
        Ok(value)
    }

    async fn push_tail(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.rpush(key, value).await?;
        Ok(len)
    }

    async fn len(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(key).await?;
        Ok(len)
    }

    async fn remove(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.lrem(key, 0, value).await?;
        Ok(removed)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Needs a live server: `REDIS_URL=redis://127.0.0.1:6379/15 cargo test -- --ignored`.
    async fn live_store() -> Option<RedisQueueStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        Some(RedisQueueStore::connect(&url).await.expect("REDIS_URL not reachable"))
    }

    fn scratch_key() -> String {
        format!("login_queue_test_{}", uuid::Uuid::new_v4().simple())
    }

    #[tokio::test]
    #[ignore = "requires REDIS_URL"]
    async fn list_commands_keep_queue_order() {
        let Some(store) = live_store().await else {
            return;
        };
        let key = scratch_key();

        assert_eq!(store.push_head(&key, "a").await.unwrap(), 1);
        assert_eq!(store.push_head(&key, "b").await.unwrap(), 2);
        assert_eq!(store.push_head(&key, "c").await.unwrap(), 3);
        assert_eq!(store.len(&key).await.unwrap(), 3);

        // Oldest first from the tail; push_tail puts it back at the front of the line.
        let head = store.pop_tail(&key).await.unwrap();
        assert_eq!(head.as_deref(), Some("a"));
        assert_eq!(store.push_tail(&key, "a").await.unwrap(), 3);
        assert_eq!(store.pop_tail(&key).await.unwrap().as_deref(), Some("a"));

        assert_eq!(store.remove(&key, "c").await.unwrap(), 1);
        assert_eq!(store.remove(&key, "c").await.unwrap(), 0);
        assert_eq!(store.pop_tail(&key).await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.pop_tail(&key).await.unwrap(), None);

        store.push_head(&key, "left-over").await.unwrap();
        assert_eq!(store.purge(&key).await.unwrap(), 1);
        assert_eq!(store.len(&key).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "requires REDIS_URL"]
    async fn ping_succeeds_on_live_server() {
        let Some(store) = live_store().await else {
            return;
        };
        store.ping().await.unwrap();
    }
}
