//! STASH Store - Backends, Tag Index, and Manager
//!
//! This crate implements the pluggable half of the STASH caching layer:
//!
//! - [`Store`]: the operation contract every backend implements.
//! - [`TagIndex`]: an in-memory bidirectional tag/key mapping used for
//!   group invalidation.
//! - [`FileStore`]: a durable backend persisting one file per key with
//!   atomic-replace writes and a background expiry sweep.
//! - [`MemoryStore`]: a process-local backend behind the same contract.
//! - [`DriverRegistry`] / [`Driver`]: explicit, injected name-to-constructor
//!   mapping (no process-wide globals).
//! - [`Manager`]: resolves named stores from declarative configuration,
//!   constructing each at most once, with a default-store convenience API
//!   and key-prefixing decorators.
//!
//! # Example
//!
//! ```ignore
//! use stash_core::{SetOptions, StoreConfig};
//! use stash_store::{default_registry, Manager};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let manager = Arc::new(Manager::new(Arc::new(default_registry())));
//! manager
//!     .register(
//!         "files",
//!         StoreConfig::new("file").with_options(serde_json::json!({"root": "/var/cache/app"})),
//!     )
//!     .await?;
//!
//! let opts = SetOptions::new()
//!     .with_expiration(Duration::from_secs(60))
//!     .with_tags(["sessions"]);
//! manager.set("session:42", serde_json::json!({"user": 7}), opts).await?;
//! manager.tagged_delete("sessions").await?;
//! ```

pub mod file_store;
pub mod manager;
pub mod memory_store;
pub mod prefixed;
pub mod registry;
pub mod store;
pub mod tag_index;

pub use file_store::FileStore;
pub use manager::Manager;
pub use memory_store::MemoryStore;
pub use prefixed::{PrefixedCache, PrefixedStore};
pub use registry::{default_registry, Driver, DriverRegistry, FileDriver, MemoryDriver};
pub use store::Store;
pub use tag_index::TagIndex;
