//! Key-prefixing decorators.
//!
//! A prefix namespaces keys inside a shared backend: `user` becomes
//! `app:user` on the way in, and result maps from multi-key and tagged
//! operations have the prefix stripped on the way out, and `tagged_delete`
//! only removes keys under the decorator's prefix. The prefix is a naming
//! convenience only, never persisted state, and it is not a full isolation
//! boundary: `clear`, `count`, and `flush` act on the whole underlying
//! store.
//!
//! [`PrefixedStore`] wraps one concrete store (used when a store's own
//! configuration carries a prefix); [`PrefixedCache`] wraps a manager and
//! follows its default store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use stash_core::{CacheError, CacheResult, SetOptions};

use crate::manager::Manager;
use crate::store::Store;

fn join(prefix: &str, key: &str) -> String {
    format!("{prefix}:{key}")
}

/// Keep only the decorator's namespace and strip the prefix from each key.
fn strip_map(prefix: &str, map: HashMap<String, Value>) -> HashMap<String, Value> {
    let full = format!("{prefix}:");
    map.into_iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(&full)
                .map(|bare| (bare.to_string(), value))
        })
        .collect()
}

/// [`Store`] decorator that namespaces every key under a fixed prefix.
pub struct PrefixedStore {
    inner: Arc<dyn Store>,
    prefix: String,
}

impl PrefixedStore {
    /// Wrap `inner`, prepending `prefix + ":"` to every key.
    pub fn new(inner: Arc<dyn Store>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl Store for PrefixedStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        self.inner.get(&join(&self.prefix, key)).await
    }

    async fn set(&self, key: &str, value: Value, options: SetOptions) -> CacheResult<()> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        self.inner.set(&join(&self.prefix, key), value, options).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        self.inner.delete(&join(&self.prefix, key)).await
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        self.inner.has(&join(&self.prefix, key)).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.inner.clear().await
    }

    async fn get_multiple(&self, keys: &[String]) -> CacheResult<HashMap<String, Value>> {
        let prefixed: Vec<String> = keys
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| join(&self.prefix, k))
            .collect();
        let found = self.inner.get_multiple(&prefixed).await?;
        Ok(strip_map(&self.prefix, found))
    }

    async fn set_multiple(
        &self,
        entries: HashMap<String, Value>,
        options: SetOptions,
    ) -> CacheResult<()> {
        let prefixed: HashMap<String, Value> = entries
            .into_iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| (join(&self.prefix, &k), v))
            .collect();
        self.inner.set_multiple(prefixed, options).await
    }

    async fn delete_multiple(&self, keys: &[String]) -> CacheResult<()> {
        let prefixed: Vec<String> = keys
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| join(&self.prefix, k))
            .collect();
        self.inner.delete_multiple(&prefixed).await
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        self.inner.increment(&join(&self.prefix, key), delta).await
    }

    async fn tagged_get(&self, tag: &str) -> CacheResult<HashMap<String, Value>> {
        let found = self.inner.tagged_get(tag).await?;
        Ok(strip_map(&self.prefix, found))
    }

    async fn tagged_delete(&self, tag: &str) -> CacheResult<()> {
        // Symmetric with `tagged_get`: only this namespace's keys go.
        let full = format!("{}:", self.prefix);
        let tagged = self.inner.tagged_get(tag).await?;
        let own: Vec<String> = tagged
            .into_keys()
            .filter(|key| key.starts_with(&full))
            .collect();
        self.inner.delete_multiple(&own).await
    }

    async fn count(&self) -> CacheResult<u64> {
        self.inner.count().await
    }

    async fn flush(&self) -> CacheResult<u64> {
        self.inner.flush().await
    }

    async fn close(&self) -> CacheResult<()> {
        self.inner.close().await
    }
}

/// Prefixing decorator over a manager's default store.
///
/// Resolves the default store on every call, so a later `set_default`
/// redirects existing decorators too.
#[derive(Clone)]
pub struct PrefixedCache {
    manager: Arc<Manager>,
    prefix: String,
}

impl PrefixedCache {
    pub(crate) fn new(manager: Arc<Manager>, prefix: impl Into<String>) -> Self {
        Self {
            manager,
            prefix: prefix.into(),
        }
    }

    async fn resolve(&self) -> CacheResult<PrefixedStore> {
        Ok(PrefixedStore::new(
            self.manager.default_store().await?,
            self.prefix.clone(),
        ))
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.resolve().await?.get(key).await
    }

    pub async fn set(&self, key: &str, value: Value, options: SetOptions) -> CacheResult<()> {
        self.resolve().await?.set(key, value, options).await
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.resolve().await?.delete(key).await
    }

    pub async fn has(&self, key: &str) -> CacheResult<bool> {
        self.resolve().await?.has(key).await
    }

    pub async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.resolve().await?.increment(key, delta).await
    }

    pub async fn decrement(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.resolve().await?.decrement(key, delta).await
    }

    pub async fn get_multiple(&self, keys: &[String]) -> CacheResult<HashMap<String, Value>> {
        self.resolve().await?.get_multiple(keys).await
    }

    pub async fn set_multiple(
        &self,
        entries: HashMap<String, Value>,
        options: SetOptions,
    ) -> CacheResult<()> {
        self.resolve().await?.set_multiple(entries, options).await
    }

    pub async fn delete_multiple(&self, keys: &[String]) -> CacheResult<()> {
        self.resolve().await?.delete_multiple(keys).await
    }

    pub async fn tagged_get(&self, tag: &str) -> CacheResult<HashMap<String, Value>> {
        self.resolve().await?.tagged_get(tag).await
    }

    pub async fn tagged_delete(&self, tag: &str) -> CacheResult<()> {
        self.resolve().await?.tagged_delete(tag).await
    }
}
