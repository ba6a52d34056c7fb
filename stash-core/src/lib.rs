//! STASH Core - Data Types, Options, and Errors
//!
//! Defines the shared vocabulary of the STASH caching layer: the persisted
//! [`CacheEntry`] unit, per-call [`SetOptions`], the declarative
//! [`StoreConfig`] / [`CacheSettings`] configuration surface, and the error
//! taxonomy. Backends and the manager live in `stash-store`.

pub mod config;
pub mod entry;
pub mod error;
pub mod options;

pub use config::{CacheSettings, StoreConfig};
pub use entry::CacheEntry;
pub use error::{CacheError, CacheResult, ConfigError, StoreError};
pub use options::SetOptions;
