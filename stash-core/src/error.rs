//! Error types for STASH operations

use thiserror::Error;

/// Errors raised by store backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Invalid key: {key:?}")]
    InvalidKey { key: String },

    #[error("Cache miss for key {key}")]
    Miss { key: String },

    #[error("Non-numeric value under key {key}, cannot increment")]
    NonNumericValue { key: String },

    #[error("Backend I/O failure at {path}: {reason}")]
    Backend { path: String, reason: String },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },
}

/// Configuration and resolution errors raised by the manager and registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown store: {name}")]
    UnknownStore { name: String },

    #[error("Unknown driver: {name}")]
    UnknownDriver { name: String },

    #[error("No default store configured")]
    NoDefaultStore,

    #[error("Driver already registered: {name}")]
    DriverAlreadyRegistered { name: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all STASH errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CacheError {
    /// Shorthand for the invalid-key error used by every keyed operation.
    pub fn invalid_key(key: &str) -> Self {
        StoreError::InvalidKey {
            key: key.to_string(),
        }
        .into()
    }

    /// Shorthand for a backend I/O failure, always carrying the offending path.
    pub fn backend(path: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::Backend {
            path: path.into(),
            reason: reason.to_string(),
        }
        .into()
    }
}

/// Result type alias for STASH operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
