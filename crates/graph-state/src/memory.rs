//! In-memory implementations of the storage traits
//!
//! Provides `MemorySaver` and `InMemoryStore`. Each instance is its own
//! isolated world: two instances never share data.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{StateError, StateResult};
use crate::storage_traits::*;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MemorySaver
// ---------------------------------------------------------------------------

/// In-memory checkpointer backed by a `HashMap<ThreadId, Vec<Checkpoint>>`.
#[derive(Debug, Default)]
pub struct MemorySaver {
    threads: Mutex<HashMap<ThreadId, Vec<Checkpoint>>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads with at least one checkpoint.
    pub fn thread_count(&self) -> usize {
        lock(&self.threads).len()
    }
}

#[async_trait]
impl Checkpointer for MemorySaver {
    async fn put(
        &self,
        thread_id: &ThreadId,
        values: serde_json::Value,
        next: Vec<String>,
    ) -> StateResult<Checkpoint> {
        let mut threads = lock(&self.threads);
        let history = threads.entry(thread_id.clone()).or_default();
        let checkpoint = Checkpoint {
            thread_id: thread_id.clone(),
            checkpoint_id: Uuid::new_v4().to_string(),
            step: history.len() as u64,
            values,
            next,
            created_at: Utc::now(),
        };
        history.push(checkpoint.clone());
        tracing::trace!(thread_id = %thread_id, step = checkpoint.step, "checkpoint saved");
        Ok(checkpoint)
    }

    async fn latest(&self, thread_id: &ThreadId) -> StateResult<Option<Checkpoint>> {
        let threads = lock(&self.threads);
        Ok(threads.get(thread_id).and_then(|h| h.last().cloned()))
    }

    async fn get(&self, thread_id: &ThreadId, checkpoint_id: &str) -> StateResult<Checkpoint> {
        let threads = lock(&self.threads);
        threads
            .get(thread_id)
            .and_then(|h| h.iter().find(|c| c.checkpoint_id == checkpoint_id))
            .cloned()
            .ok_or_else(|| StateError::CheckpointNotFound {
                thread_id: thread_id.to_string(),
                checkpoint_id: checkpoint_id.to_string(),
            })
    }

    async fn history(&self, thread_id: &ThreadId) -> StateResult<Vec<Checkpoint>> {
        let threads = lock(&self.threads);
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }

    async fn delete_thread(&self, thread_id: &ThreadId) -> StateResult<()> {
        lock(&self.threads).remove(thread_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

/// In-memory key/value store ordered by `(namespace, key)`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: Mutex<BTreeMap<(Namespace, String), StoreItem>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: serde_json::Value,
    ) -> StateResult<()> {
        let now = Utc::now();
        let mut items = lock(&self.items);
        items
            .entry((namespace.clone(), key.to_string()))
            .and_modify(|item| {
                item.value = value.clone();
                item.updated_at = now;
            })
            .or_insert_with(|| StoreItem {
                namespace: namespace.clone(),
                key: key.to_string(),
                value: value.clone(),
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> StateResult<Option<StoreItem>> {
        let items = lock(&self.items);
        Ok(items.get(&(namespace.clone(), key.to_string())).cloned())
    }

    async fn search(&self, prefix: &Namespace) -> StateResult<Vec<StoreItem>> {
        let items = lock(&self.items);
        Ok(items
            .values()
            .filter(|item| item.namespace.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> StateResult<()> {
        lock(&self.items).remove(&(namespace.clone(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_saver_steps_increase() {
        let saver = MemorySaver::new();
        let thread = ThreadId::new();
        let first = saver.put(&thread, json!({"n": 1}), vec![]).await.unwrap();
        let second = saver.put(&thread, json!({"n": 2}), vec![]).await.unwrap();
        assert_eq!(first.step, 0);
        assert_eq!(second.step, 1);
        assert_eq!(saver.thread_count(), 1);
    }

    #[tokio::test]
    async fn test_store_put_replaces_value() {
        let store = InMemoryStore::new();
        let ns = Namespace::new(["email_assistant", "background"]).unwrap();
        store.put(&ns, "user", json!("v1")).await.unwrap();
        store.put(&ns, "user", json!("v2")).await.unwrap();
        let item = store.get(&ns, "user").await.unwrap().unwrap();
        assert_eq!(item.value, json!("v2"));
        assert_eq!(store.len(), 1);
    }
}
