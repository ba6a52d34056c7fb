//! Driver registry.
//!
//! A [`Driver`] turns a [`StoreConfig`] into a running [`Store`]. The
//! [`DriverRegistry`] is an explicit, constructed object handed to the
//! manager rather than process-wide state, so tests can run isolated
//! registries side by side. Registration is write-once per name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use stash_core::{CacheResult, ConfigError, StoreConfig};

use crate::file_store::FileStore;
use crate::memory_store::MemoryStore;
use crate::store::Store;

/// Constructor for one store backend.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Build a store from its declarative configuration.
    async fn build(&self, config: &StoreConfig) -> CacheResult<Arc<dyn Store>>;
}

/// Name-to-driver mapping, write-once per name.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under `name`.
    ///
    /// Fails with `DriverAlreadyRegistered` when the name is taken; a
    /// driver name can never be rebound once registered.
    pub fn register(&self, name: impl Into<String>, driver: Arc<dyn Driver>) -> CacheResult<()> {
        let name = name.into();
        let mut drivers = self.drivers.write().unwrap_or_else(|e| e.into_inner());
        if drivers.contains_key(&name) {
            return Err(ConfigError::DriverAlreadyRegistered { name }.into());
        }
        drivers.insert(name, driver);
        Ok(())
    }

    /// Look up a driver by name.
    pub fn lookup(&self, name: &str) -> CacheResult<Arc<dyn Driver>> {
        let drivers = self.drivers.read().unwrap_or_else(|e| e.into_inner());
        drivers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDriver {
                name: name.to_string(),
            }
            .into())
    }
}

/// Driver for the file-backed store.
pub struct FileDriver;

#[async_trait]
impl Driver for FileDriver {
    async fn build(&self, config: &StoreConfig) -> CacheResult<Arc<dyn Store>> {
        let store: Arc<dyn Store> = FileStore::open(config).await?;
        Ok(store)
    }
}

/// Driver for the in-memory store.
pub struct MemoryDriver;

#[async_trait]
impl Driver for MemoryDriver {
    async fn build(&self, config: &StoreConfig) -> CacheResult<Arc<dyn Store>> {
        let store: Arc<dyn Store> = MemoryStore::open(config).await?;
        Ok(store)
    }
}

/// A registry with the built-in `file` and `memory` drivers pre-registered.
pub fn default_registry() -> DriverRegistry {
    let registry = DriverRegistry::new();
    // Fresh registry, names cannot collide.
    let _ = registry.register("file", Arc::new(FileDriver));
    let _ = registry.register("memory", Arc::new(MemoryDriver));
    registry
}
