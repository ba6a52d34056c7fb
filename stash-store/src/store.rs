//! The store contract.
//!
//! Every cache backend implements [`Store`]. The trait is object-safe so
//! the manager can hold `Arc<dyn Store>` instances resolved at runtime
//! from driver names; values are `serde_json::Value` to keep the payload
//! opaque at this boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use stash_core::{CacheResult, SetOptions};

/// Contract implemented by every cache backend.
///
/// # Expiry
///
/// An entry whose expiry instant has passed is logically absent: `get`,
/// `has`, `get_multiple`, `tagged_get`, and `count` must all treat it as a
/// miss and are allowed to remove it lazily.
///
/// # Concurrency
///
/// Implementations must be safe for concurrent use. Operations on a single
/// key observe a linearizable history once serialized through the store's
/// internal lock; there is no ordering guarantee across store instances.
///
/// # Cancellation
///
/// All operations are futures; dropping one cancels it. Implementations
/// must not leave partial on-disk state behind when a write is cancelled
/// mid-flight.
///
/// # Partial failure
///
/// The multi-key operations (`get_multiple`, `set_multiple`,
/// `delete_multiple`) skip empty keys silently and fail fast on the first
/// backend error, leaving already-applied effects in place. There is no
/// rollback.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get the live value under `key`, or `None` on miss or expiry.
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Write `value` under `key`, unconditionally replacing any prior entry
    /// (including its tags).
    async fn set(&self, key: &str, value: Value, options: SetOptions) -> CacheResult<()>;

    /// Delete the entry under `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Whether a live (non-expired) entry exists under `key`.
    async fn has(&self, key: &str) -> CacheResult<bool>;

    /// Remove every entry this store owns, live or expired.
    async fn clear(&self) -> CacheResult<()>;

    /// Get the live values for `keys`. Missing and expired keys are simply
    /// absent from the result.
    async fn get_multiple(&self, keys: &[String]) -> CacheResult<HashMap<String, Value>>;

    /// Write every entry with the same `options`.
    async fn set_multiple(
        &self,
        entries: HashMap<String, Value>,
        options: SetOptions,
    ) -> CacheResult<()>;

    /// Delete every key in `keys`, best-effort.
    async fn delete_multiple(&self, keys: &[String]) -> CacheResult<()>;

    /// Add `delta` to the integer stored under `key` and return the result.
    ///
    /// An absent or expired key counts as 0. A present value that is not an
    /// integer fails with `NonNumericValue` and leaves the stored value
    /// unchanged. The entry's TTL and tags are preserved.
    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// Subtract `delta` from the integer stored under `key`.
    ///
    /// `i64::MIN` has no negation, so it saturates to an increment of
    /// `i64::MAX`.
    async fn decrement(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.increment(key, delta.checked_neg().unwrap_or(i64::MAX))
            .await
    }

    /// All live values currently associated with `tag`, keyed by cache key.
    async fn tagged_get(&self, tag: &str) -> CacheResult<HashMap<String, Value>>;

    /// Delete every key associated with `tag`, then drop the tag itself.
    async fn tagged_delete(&self, tag: &str) -> CacheResult<()>;

    /// Number of currently-live entries.
    async fn count(&self) -> CacheResult<u64>;

    /// Full expiry sweep: delete every expired entry and release its tag
    /// associations. Returns the number of entries removed. Distinct from
    /// [`Store::clear`], which is unconditional.
    async fn flush(&self) -> CacheResult<u64>;

    /// Stop the store's background sweep. Safe to call more than once;
    /// other operations remain usable afterwards.
    async fn close(&self) -> CacheResult<()>;
}
