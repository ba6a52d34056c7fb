//! Configuration types
//!
//! [`StoreConfig`] describes one named store declaratively: which driver
//! builds it, an optional key prefix, a default TTL, and a free-form block
//! of driver-specific options. [`CacheSettings`] is the surface a host
//! application deserializes from its own config file and hands to the
//! manager in one call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Declarative configuration for one named store.
///
/// Immutable once registered: re-registering a name overwrites the stored
/// configuration but never mutates an already-constructed store instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Driver name resolved through the driver registry (e.g. "file",
    /// "memory").
    pub driver: String,

    /// Optional prefix prepended to every key of this store.
    #[serde(default)]
    pub prefix: Option<String>,

    /// Default TTL in seconds applied when a write carries no explicit TTL.
    /// Zero or absent means entries never expire by default.
    #[serde(default)]
    pub ttl_secs: u64,

    /// Driver-specific options (e.g. the file backend's root directory).
    #[serde(default)]
    pub options: Value,
}

impl StoreConfig {
    /// Create a configuration for the named driver with no prefix, no
    /// default TTL, and empty driver options.
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            prefix: None,
            ttl_secs: 0,
            options: Value::Null,
        }
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    /// Set the driver-specific options block.
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// The default TTL as a duration, or `None` when entries never expire
    /// by default.
    pub fn default_ttl(&self) -> Option<Duration> {
        if self.ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.ttl_secs))
        }
    }

    /// Fetch a string field from the driver options block.
    pub fn option_str(&self, field: &str) -> Option<&str> {
        self.options.get(field).and_then(Value::as_str)
    }

    /// Fetch an unsigned integer field from the driver options block.
    pub fn option_u64(&self, field: &str) -> Option<u64> {
        self.options.get(field).and_then(Value::as_u64)
    }
}

/// Host-facing configuration surface: a default store name plus one
/// [`StoreConfig`] per named store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Name of the store used by the manager's convenience methods.
    #[serde(default)]
    pub default_store: Option<String>,

    /// Named store configurations.
    #[serde(default)]
    pub stores: HashMap<String, StoreConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_config_builder() {
        let config = StoreConfig::new("file")
            .with_prefix("app")
            .with_ttl(Duration::from_secs(300))
            .with_options(json!({"root": "/var/cache/app", "extension": "bin"}));

        assert_eq!(config.driver, "file");
        assert_eq!(config.prefix.as_deref(), Some("app"));
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(300)));
        assert_eq!(config.option_str("root"), Some("/var/cache/app"));
        assert_eq!(config.option_str("missing"), None);
    }

    #[test]
    fn test_zero_ttl_means_never_expires() {
        let config = StoreConfig::new("memory");
        assert_eq!(config.ttl_secs, 0);
        assert!(config.default_ttl().is_none());
    }

    #[test]
    fn test_settings_deserialize_from_json() {
        let raw = json!({
            "default_store": "files",
            "stores": {
                "files": {"driver": "file", "ttl_secs": 60, "options": {"root": "/tmp/c"}},
                "fast": {"driver": "memory"}
            }
        });
        let settings: CacheSettings =
            serde_json::from_value(raw).expect("settings should deserialize");

        assert_eq!(settings.default_store.as_deref(), Some("files"));
        assert_eq!(settings.stores.len(), 2);
        assert_eq!(settings.stores["files"].option_str("root"), Some("/tmp/c"));
        assert_eq!(settings.stores["fast"].driver, "memory");
        assert!(settings.stores["fast"].default_ttl().is_none());
    }
}
