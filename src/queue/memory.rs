//! In-process queue store for single-instance deployments.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::watch;

use crate::queue::store::{OrderedQueueStore, StoreResult};

/// Mutex-protected deques keyed by queue name.
///
/// Every mutation bumps a watch counter so the dispatcher wakes on change
/// instead of sleeping out its poll interval.
#[derive(Debug)]
pub struct InMemoryQueueStore {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    changes: watch::Sender<u64>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            lists: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Snapshot of a list, oldest (tail) first.
    pub fn snapshot(&self, key: &str) -> Vec<String> {
        let lists = self.lists.lock().expect("queue store mutex poisoned");
        lists
            .get(key)
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Apply `f` to the list under `key`. `f` reports whether it changed
    /// the list; only real changes wake watchers.
    fn mutate<T>(&self, key: &str, f: impl FnOnce(&mut VecDeque<String>) -> (T, bool)) -> T {
        let (result, changed) = {
            let mut lists = self.lists.lock().expect("queue store mutex poisoned");
            let list = lists.entry(key.to_string()).or_default();
            let outcome = f(list);
            if list.is_empty() {
                lists.remove(key);
            }
            outcome
        };
        if changed {
            self.changes.send_modify(|version| *version += 1);
        }
        result
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderedQueueStore for InMemoryQueueStore {
    async fn push_head(&self, key: &str, value: &str) -> StoreResult<u64> {
        Ok(self.mutate(key, |list| {
            list.push_front(value.to_string());
            (list.len() as u64, true)
        }))
    }

    async fn pop_tail(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.mutate(key, |list| {
            let popped = list.pop_back();
            let changed = popped.is_some();
            (popped, changed)
        }))
    }

    async fn push_tail(&self, key: &str, value: &str) -> StoreResult<u64> {
        Ok(self.mutate(key, |list| {
            list.push_back(value.to_string());
            (list.len() as u64, true)
        }))
    }

    async fn len(&self, key: &str) -> StoreResult<u64> {
        let lists = self.lists.lock().expect("queue store mutex poisoned");
        Ok(lists.get(key).map_or(0, |list| list.len() as u64))
    }

    async fn remove(&self, key: &str, value: &str) -> StoreResult<u64> {
        Ok(self.mutate(key, |list| {
            let before = list.len();
            list.retain(|item| item != value);
            let removed = (before - list.len()) as u64;
            (removed, removed > 0)
        }))
    }

    fn changes(&self) -> Option<watch::Receiver<u64>> {
        Some(self.changes.subscribe())
    }
}
