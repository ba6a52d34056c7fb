//! Cache manager.
//!
//! The manager owns a registry of named store configurations and lazily
//! materializes each store through the injected [`DriverRegistry`] on
//! first access, constructing it at most once. The first registered name
//! becomes the default store unless `set_default` picks another, and a
//! pass-through convenience API delegates every store operation to the
//! default.
//!
//! Construction is serialized under the manager's single lock: two tasks
//! racing on the same name observe one instance, and the simple coarse
//! lock is the deliberate trade against per-name locking. Operations on
//! already-constructed stores never go through the manager's lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use stash_core::{CacheResult, CacheSettings, ConfigError, SetOptions, StoreConfig};
use tokio::sync::Mutex;

use crate::prefixed::{PrefixedCache, PrefixedStore};
use crate::registry::DriverRegistry;
use crate::store::Store;

#[derive(Default)]
struct ManagerInner {
    configs: HashMap<String, StoreConfig>,
    stores: HashMap<String, Arc<dyn Store>>,
    default_name: Option<String>,
}

/// Front-end resolving named stores from declarative configuration.
pub struct Manager {
    registry: Arc<DriverRegistry>,
    inner: Mutex<ManagerInner>,
}

impl Manager {
    /// Create a manager backed by the given driver registry.
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            inner: Mutex::new(ManagerInner::default()),
        }
    }

    /// Register a store configuration under `name`.
    ///
    /// The first registered name becomes the default store. Re-registering
    /// a name overwrites the stored configuration but does not affect an
    /// already-constructed store instance.
    pub async fn register(&self, name: impl Into<String>, config: StoreConfig) {
        let name = name.into();
        let mut inner = self.inner.lock().await;
        if inner.default_name.is_none() {
            inner.default_name = Some(name.clone());
        }
        inner.configs.insert(name, config);
    }

    /// Register every store from a host configuration block and apply its
    /// default-store choice.
    pub async fn configure(&self, settings: CacheSettings) -> CacheResult<()> {
        {
            let mut inner = self.inner.lock().await;
            for (name, config) in settings.stores {
                if inner.default_name.is_none() {
                    inner.default_name = Some(name.clone());
                }
                inner.configs.insert(name, config);
            }
        }
        if let Some(name) = settings.default_store {
            self.set_default(&name).await?;
        }
        Ok(())
    }

    /// Choose the store used by the convenience methods.
    pub async fn set_default(&self, name: &str) -> CacheResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.configs.contains_key(name) {
            return Err(ConfigError::UnknownStore {
                name: name.to_string(),
            }
            .into());
        }
        inner.default_name = Some(name.to_string());
        Ok(())
    }

    /// Resolve the store registered under `name`, constructing and caching
    /// it on first access. A configured key prefix is applied here as a
    /// [`PrefixedStore`] wrapper.
    pub async fn store(&self, name: &str) -> CacheResult<Arc<dyn Store>> {
        let mut inner = self.inner.lock().await;
        if let Some(store) = inner.stores.get(name) {
            return Ok(Arc::clone(store));
        }

        let config = inner
            .configs
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownStore {
                name: name.to_string(),
            })?;
        let driver = self.registry.lookup(&config.driver)?;

        tracing::debug!(store = name, driver = %config.driver, "Constructing cache store");
        let built = driver.build(&config).await?;
        let store: Arc<dyn Store> = match &config.prefix {
            Some(prefix) => Arc::new(PrefixedStore::new(built, prefix.clone())),
            None => built,
        };
        inner.stores.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// The default store, constructing it on first access.
    pub async fn default_store(&self) -> CacheResult<Arc<dyn Store>> {
        let name = {
            let inner = self.inner.lock().await;
            inner
                .default_name
                .clone()
                .ok_or(ConfigError::NoDefaultStore)?
        };
        self.store(&name).await
    }

    /// Decorator namespacing every key under `prefix` before delegating to
    /// the default store.
    pub fn with_prefix(self: &Arc<Self>, prefix: impl Into<String>) -> PrefixedCache {
        PrefixedCache::new(Arc::clone(self), prefix)
    }

    /// Stop the background sweeps of every constructed store.
    pub async fn close_all(&self) -> CacheResult<()> {
        let stores: Vec<Arc<dyn Store>> = {
            let inner = self.inner.lock().await;
            inner.stores.values().cloned().collect()
        };
        for store in stores {
            store.close().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Convenience pass-throughs to the default store
    // ------------------------------------------------------------------

    pub async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.default_store().await?.get(key).await
    }

    pub async fn set(&self, key: &str, value: Value, options: SetOptions) -> CacheResult<()> {
        self.default_store().await?.set(key, value, options).await
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.default_store().await?.delete(key).await
    }

    pub async fn has(&self, key: &str) -> CacheResult<bool> {
        self.default_store().await?.has(key).await
    }

    pub async fn clear(&self) -> CacheResult<()> {
        self.default_store().await?.clear().await
    }

    pub async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.default_store().await?.increment(key, delta).await
    }

    pub async fn decrement(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.default_store().await?.decrement(key, delta).await
    }

    pub async fn get_multiple(&self, keys: &[String]) -> CacheResult<HashMap<String, Value>> {
        self.default_store().await?.get_multiple(keys).await
    }

    pub async fn set_multiple(
        &self,
        entries: HashMap<String, Value>,
        options: SetOptions,
    ) -> CacheResult<()> {
        self.default_store().await?.set_multiple(entries, options).await
    }

    pub async fn delete_multiple(&self, keys: &[String]) -> CacheResult<()> {
        self.default_store().await?.delete_multiple(keys).await
    }

    pub async fn tagged_get(&self, tag: &str) -> CacheResult<HashMap<String, Value>> {
        self.default_store().await?.tagged_get(tag).await
    }

    pub async fn tagged_delete(&self, tag: &str) -> CacheResult<()> {
        self.default_store().await?.tagged_delete(tag).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::registry::{default_registry, Driver, MemoryDriver};
    use async_trait::async_trait;
    use serde_json::json;
    use stash_core::CacheError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory driver that counts how many stores it has built.
    struct CountingDriver {
        builds: AtomicUsize,
    }

    impl CountingDriver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Driver for CountingDriver {
        async fn build(&self, config: &StoreConfig) -> CacheResult<Arc<dyn Store>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            MemoryDriver.build(config).await
        }
    }

    fn manager_with_counting_driver() -> (Arc<Manager>, Arc<CountingDriver>) {
        let driver = CountingDriver::new();
        let registry = DriverRegistry::new();
        let as_driver: Arc<dyn Driver> = driver.clone();
        registry
            .register("counting", as_driver)
            .expect("registration should succeed");
        (Arc::new(Manager::new(Arc::new(registry))), driver)
    }

    #[tokio::test]
    async fn test_first_registered_store_becomes_default() {
        let (manager, _driver) = manager_with_counting_driver();
        manager.register("a", StoreConfig::new("counting")).await;
        manager.register("b", StoreConfig::new("counting")).await;

        manager
            .set("k", json!(1), SetOptions::new())
            .await
            .expect("set should succeed");
        let a = manager.store("a").await.expect("store should resolve");
        assert_eq!(
            a.get("k").await.expect("get should succeed"),
            Some(json!(1))
        );

        let b = manager.store("b").await.expect("store should resolve");
        assert_eq!(b.get("k").await.expect("get should succeed"), None);
    }

    #[tokio::test]
    async fn test_store_is_constructed_exactly_once() {
        let (manager, driver) = manager_with_counting_driver();
        manager.register("a", StoreConfig::new("counting")).await;

        let first = manager.store("a").await.expect("store should resolve");
        let second = manager.store("a").await.expect("store should resolve");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(driver.builds.load(Ordering::SeqCst), 1);

        // Concurrent accessors also land on the single instance.
        let (manager2, driver2) = manager_with_counting_driver();
        manager2.register("a", StoreConfig::new("counting")).await;
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager2);
                tokio::spawn(async move { manager.store("a").await })
            })
            .collect();
        for task in tasks {
            task.await
                .expect("task should not panic")
                .expect("store should resolve");
        }
        assert_eq!(driver2.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reregistering_does_not_replace_constructed_store() {
        let (manager, driver) = manager_with_counting_driver();
        manager.register("a", StoreConfig::new("counting")).await;
        let first = manager.store("a").await.expect("store should resolve");

        manager
            .register("a", StoreConfig::new("counting").with_prefix("v2"))
            .await;
        let second = manager.store("a").await.expect("store should resolve");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(driver.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_default_unknown_store_fails() {
        let (manager, _driver) = manager_with_counting_driver();
        let err = manager
            .set_default("nope")
            .await
            .expect_err("set_default should fail");
        assert_eq!(
            err,
            CacheError::Config(ConfigError::UnknownStore {
                name: "nope".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_no_default_store_error() {
        let (manager, _driver) = manager_with_counting_driver();
        let err = manager.get("k").await.expect_err("get should fail");
        assert_eq!(err, CacheError::Config(ConfigError::NoDefaultStore));
    }

    #[tokio::test]
    async fn test_unknown_driver_surfaces_as_config_error() {
        let manager = Manager::new(Arc::new(DriverRegistry::new()));
        manager.register("a", StoreConfig::new("redis")).await;
        let err = manager
            .store("a")
            .await
            .map(|_| ())
            .expect_err("store should fail");
        assert_eq!(
            err,
            CacheError::Config(ConfigError::UnknownDriver {
                name: "redis".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_configure_registers_stores_and_default() {
        let manager = Manager::new(Arc::new(default_registry()));
        let settings: CacheSettings = serde_json::from_value(json!({
            "default_store": "fast",
            "stores": {
                "fast": {"driver": "memory"},
                "other": {"driver": "memory", "ttl_secs": 60}
            }
        }))
        .expect("settings should deserialize");

        manager
            .configure(settings)
            .await
            .expect("configure should succeed");
        manager
            .set("k", json!(1), SetOptions::new())
            .await
            .expect("set should succeed");
        let fast = manager.store("fast").await.expect("store should resolve");
        assert_eq!(
            fast.get("k").await.expect("get should succeed"),
            Some(json!(1))
        );
    }

    #[tokio::test]
    async fn test_configure_with_unknown_default_fails() {
        let manager = Manager::new(Arc::new(default_registry()));
        let settings = CacheSettings {
            default_store: Some("ghost".to_string()),
            stores: HashMap::new(),
        };
        let err = manager
            .configure(settings)
            .await
            .expect_err("configure should fail");
        assert!(matches!(
            err,
            CacheError::Config(ConfigError::UnknownStore { .. })
        ));
    }

    #[tokio::test]
    async fn test_configured_prefix_wraps_the_store() {
        let registry = Arc::new(default_registry());
        let manager = Manager::new(Arc::clone(&registry));
        manager
            .register("a", StoreConfig::new("memory").with_prefix("ns"))
            .await;

        manager
            .set("k", json!(1), SetOptions::new())
            .await
            .expect("set should succeed");
        let found = manager
            .get_multiple(&["k".to_string()])
            .await
            .expect("get_multiple should succeed");
        assert_eq!(found, HashMap::from([("k".to_string(), json!(1))]));
    }

    #[tokio::test]
    async fn test_with_prefix_namespaces_the_default_store() {
        let manager = Arc::new(Manager::new(Arc::new(default_registry())));
        manager.register("a", StoreConfig::new("memory")).await;

        let scoped = manager.with_prefix("jobs");
        scoped
            .set("1", json!("queued"), SetOptions::new())
            .await
            .expect("set should succeed");

        assert_eq!(
            scoped.get("1").await.expect("get should succeed"),
            Some(json!("queued"))
        );
        // Raw key is namespaced in the underlying store.
        assert_eq!(
            manager.get("jobs:1").await.expect("get should succeed"),
            Some(json!("queued"))
        );
        assert_eq!(manager.get("1").await.expect("get should succeed"), None);
    }

    #[tokio::test]
    async fn test_passthroughs_reach_the_default_store() {
        let manager = Manager::new(Arc::new(default_registry()));
        manager.register("a", StoreConfig::new("memory")).await;

        manager
            .set("n", json!(1), SetOptions::new().with_tags(["grp"]))
            .await
            .expect("set should succeed");
        assert!(manager.has("n").await.expect("has should succeed"));
        assert_eq!(
            manager.increment("n", 4).await.expect("increment should succeed"),
            5
        );
        assert_eq!(
            manager.decrement("n", 2).await.expect("decrement should succeed"),
            3
        );
        assert_eq!(
            manager
                .tagged_get("grp")
                .await
                .expect("tagged_get should succeed")
                .len(),
            1
        );
        manager
            .tagged_delete("grp")
            .await
            .expect("tagged_delete should succeed");
        assert!(!manager.has("n").await.expect("has should succeed"));

        manager.clear().await.expect("clear should succeed");
        manager.close_all().await.expect("close_all should succeed");
    }

    #[tokio::test]
    async fn test_unrelated_store_not_blocked_by_construction() {
        // A slow driver holding up one name must not stall operations on a
        // store that is already built.
        struct SlowDriver;

        #[async_trait]
        impl Driver for SlowDriver {
            async fn build(&self, config: &StoreConfig) -> CacheResult<Arc<dyn Store>> {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                let store: Arc<dyn Store> = MemoryStore::open(config).await?;
                Ok(store)
            }
        }

        let registry = DriverRegistry::new();
        registry
            .register("memory", Arc::new(MemoryDriver))
            .expect("registration should succeed");
        registry
            .register("slow", Arc::new(SlowDriver))
            .expect("registration should succeed");
        let manager = Arc::new(Manager::new(Arc::new(registry)));
        manager.register("fast", StoreConfig::new("memory")).await;
        manager.register("lazy", StoreConfig::new("slow")).await;

        let fast = manager.store("fast").await.expect("store should resolve");
        fast.set("k", json!(1), SetOptions::new())
            .await
            .expect("set should succeed");

        let builder = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.store("lazy").await })
        };
        // The already-built store keeps serving while "lazy" constructs.
        assert_eq!(
            fast.get("k").await.expect("get should succeed"),
            Some(json!(1))
        );
        builder
            .await
            .expect("task should not panic")
            .expect("store should resolve");
    }
}
