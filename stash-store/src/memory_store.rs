//! In-memory cache store.
//!
//! A process-local [`Store`] behind the same contract and lock discipline
//! as the file backend: one `RwLock` guards the entry map and the tag
//! index, and a periodic sweep task removes expired entries. Useful as the
//! `memory` driver and as the reference backend in manager tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use stash_core::{CacheEntry, CacheError, CacheResult, SetOptions, StoreConfig, StoreError};
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};

use crate::file_store::DEFAULT_SWEEP_INTERVAL_SECS;
use crate::store::Store;
use crate::tag_index::TagIndex;

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    tags: TagIndex,
}

/// HashMap-backed [`Store`].
pub struct MemoryStore {
    default_ttl: Option<Duration>,
    state: RwLock<MemoryState>,
    shutdown: watch::Sender<bool>,
}

impl MemoryStore {
    /// Open a memory store from its driver configuration.
    ///
    /// Recognized driver options: `sweep_interval_secs` (default 60).
    /// Spawns the periodic sweep task; must be called within a Tokio
    /// runtime.
    pub async fn open(config: &StoreConfig) -> CacheResult<Arc<Self>> {
        let sweep_every = Duration::from_secs(
            config
                .option_u64("sweep_interval_secs")
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
                .max(1),
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let store = Arc::new(Self {
            default_ttl: config.default_ttl(),
            state: RwLock::new(MemoryState::default()),
            shutdown,
        });
        spawn_sweep(&store, sweep_every, shutdown_rx);
        Ok(store)
    }

    fn expiry_from(&self, now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
        ttl.or(self.default_ttl)
            .and_then(|t| chrono::Duration::from_std(t).ok().map(|d| now + d))
    }

    /// Remove every expired entry and its tag links. One writer-lock
    /// acquisition; the map is all in memory, so there is no per-item I/O
    /// to interleave with foreground operations.
    async fn sweep_pass(&self) -> CacheResult<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let expired: Vec<String> = state
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key.clone())
            .collect();
        for key in &expired {
            state.entries.remove(key);
            state.tags.remove_key(key);
        }
        Ok(expired.len() as u64)
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn spawn_sweep(store: &Arc<MemoryStore>, every: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let weak = Arc::downgrade(store);
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let Some(store) = weak.upgrade() else { break };
                    if let Ok(removed) = store.sweep_pass().await {
                        if removed > 0 {
                            tracing::debug!(removed, "Expiry sweep removed entries");
                        }
                    }
                }
            }
        }
    });
}

fn dedup_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags.iter().filter(|t| !t.is_empty()).cloned().collect();
    out.sort();
    out.dedup();
    out
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        let now = Utc::now();
        {
            let state = self.state.read().await;
            match state.entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }

        // Expired: remove lazily under the write lock.
        let mut state = self.state.write().await;
        if state.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            state.entries.remove(key);
            state.tags.remove_key(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, options: SetOptions) -> CacheResult<()> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        let now = Utc::now();
        let tags = dedup_tags(&options.tags);
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            expires_at: self.expiry_from(now, options.ttl),
            tags: tags.clone(),
            created_at: now,
        };

        let mut state = self.state.write().await;
        state.entries.insert(key.to_string(), entry);
        state.tags.remove_key(key);
        state.tags.add_tags(key, &tags);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        let mut state = self.state.write().await;
        state.entries.remove(key);
        state.tags.remove_key(key);
        Ok(())
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.tags.clear();
        Ok(())
    }

    async fn get_multiple(&self, keys: &[String]) -> CacheResult<HashMap<String, Value>> {
        let mut found = HashMap::new();
        for key in keys {
            if key.is_empty() {
                continue;
            }
            if let Some(value) = self.get(key).await? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn set_multiple(
        &self,
        entries: HashMap<String, Value>,
        options: SetOptions,
    ) -> CacheResult<()> {
        for (key, value) in entries {
            if key.is_empty() {
                continue;
            }
            self.set(&key, value, options.clone()).await?;
        }
        Ok(())
    }

    async fn delete_multiple(&self, keys: &[String]) -> CacheResult<()> {
        for key in keys {
            if key.is_empty() {
                continue;
            }
            self.delete(key).await?;
        }
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        let mut state = self.state.write().await;
        let now = Utc::now();

        let prior = match state.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.clone()),
            Some(_) => {
                state.entries.remove(key);
                state.tags.remove_key(key);
                None
            }
            None => None,
        };

        let (current, expires_at, tags, created_at) = match &prior {
            Some(entry) => {
                let n = entry.value.as_i64().ok_or_else(|| StoreError::NonNumericValue {
                    key: key.to_string(),
                })?;
                (n, entry.expires_at, entry.tags.clone(), entry.created_at)
            }
            None => (0, self.expiry_from(now, None), Vec::new(), now),
        };

        let updated = current.saturating_add(delta);
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value: Value::from(updated),
                expires_at,
                tags: tags.clone(),
                created_at,
            },
        );
        state.tags.remove_key(key);
        state.tags.add_tags(key, &tags);
        Ok(updated)
    }

    async fn tagged_get(&self, tag: &str) -> CacheResult<HashMap<String, Value>> {
        let keys: Vec<String> = {
            let state = self.state.read().await;
            state.tags.keys_for_tag(tag).into_iter().collect()
        };
        let mut found = HashMap::new();
        for key in keys {
            if let Some(value) = self.get(&key).await? {
                found.insert(key, value);
            }
        }
        Ok(found)
    }

    async fn tagged_delete(&self, tag: &str) -> CacheResult<()> {
        let mut state = self.state.write().await;
        for key in state.tags.keys_for_tag(tag) {
            state.entries.remove(&key);
            state.tags.remove_key(&key);
        }
        state.tags.remove_tag(tag);
        Ok(())
    }

    async fn count(&self) -> CacheResult<u64> {
        let state = self.state.read().await;
        let now = Utc::now();
        Ok(state
            .entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count() as u64)
    }

    async fn flush(&self) -> CacheResult<u64> {
        self.sweep_pass().await
    }

    async fn close(&self) -> CacheResult<()> {
        let _ = self.shutdown.send(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn create_test_store() -> Arc<MemoryStore> {
        MemoryStore::open(&StoreConfig::new("memory"))
            .await
            .expect("open should succeed")
    }

    #[tokio::test]
    async fn test_round_trip_and_overwrite() {
        let store = create_test_store().await;

        store
            .set("k", json!({"a": 1}), SetOptions::new())
            .await
            .expect("set should succeed");
        assert_eq!(
            store.get("k").await.expect("get should succeed"),
            Some(json!({"a": 1}))
        );

        store
            .set("k", json!({"a": 2}), SetOptions::new())
            .await
            .expect("set should succeed");
        assert_eq!(
            store.get("k").await.expect("get should succeed"),
            Some(json!({"a": 2}))
        );
    }

    #[tokio::test]
    async fn test_expiry_is_a_miss() {
        let store = create_test_store().await;

        store
            .set(
                "k",
                json!(1),
                SetOptions::new().with_expiration(Duration::from_millis(20)),
            )
            .await
            .expect("set should succeed");
        assert!(store.has("k").await.expect("has should succeed"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!store.has("k").await.expect("has should succeed"));
        assert_eq!(store.count().await.expect("count should succeed"), 0);
    }

    #[tokio::test]
    async fn test_expired_entry_releases_its_tags() {
        let store = create_test_store().await;

        store
            .set(
                "k",
                json!(1),
                SetOptions::new()
                    .with_expiration(Duration::from_millis(20))
                    .with_tags(["grp"]),
            )
            .await
            .expect("set should succeed");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let removed = store.flush().await.expect("flush should succeed");
        assert_eq!(removed, 1);
        assert!(store
            .tagged_get("grp")
            .await
            .expect("tagged_get should succeed")
            .is_empty());
    }

    #[tokio::test]
    async fn test_tagged_delete_leaves_other_tags_intact() {
        let store = create_test_store().await;

        store
            .set("a", json!(1), SetOptions::new().with_tags(["x"]))
            .await
            .expect("set should succeed");
        store
            .set("c", json!(3), SetOptions::new().with_tags(["y"]))
            .await
            .expect("set should succeed");

        store
            .tagged_delete("x")
            .await
            .expect("tagged_delete should succeed");
        assert_eq!(store.get("a").await.expect("get should succeed"), None);
        assert_eq!(
            store.get("c").await.expect("get should succeed"),
            Some(json!(3))
        );
    }

    #[tokio::test]
    async fn test_increment_on_absent_key_starts_at_zero() {
        let store = create_test_store().await;
        assert_eq!(
            store.increment("n", 7).await.expect("increment should succeed"),
            7
        );
        assert_eq!(
            store.decrement("n", 3).await.expect("decrement should succeed"),
            4
        );
    }

    #[tokio::test]
    async fn test_increment_non_numeric_fails() {
        let store = create_test_store().await;
        store
            .set("s", json!([1, 2]), SetOptions::new())
            .await
            .expect("set should succeed");
        let err = store
            .increment("s", 1)
            .await
            .expect_err("increment should fail");
        assert!(matches!(
            err,
            CacheError::Store(StoreError::NonNumericValue { .. })
        ));
    }
}
