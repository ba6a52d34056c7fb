//! The persisted cache unit.
//!
//! A [`CacheEntry`] is what a backend stores for one key: the key itself,
//! an opaque JSON payload, an optional absolute expiry instant, the tags
//! attached at write time, and the creation timestamp. The file backend
//! serializes the whole struct as one JSON record per file; the in-memory
//! backend keeps it as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single cache entry, owned exclusively by one store instance.
///
/// # Expiry
///
/// `expires_at` of `None` means the entry never expires. An entry whose
/// `expires_at` is at or before the current instant is logically absent:
/// every read path treats it as a miss and removes it lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Caller-supplied key, unique within a store. Never empty.
    pub key: String,

    /// Opaque structured payload.
    pub value: Value,

    /// Absolute expiry instant; `None` means never expires.
    pub expires_at: Option<DateTime<Utc>>,

    /// Tags attached to this entry at write time, possibly empty.
    pub tags: Vec<String>,

    /// When the entry was written. Informational only.
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry with no expiry and no tags.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            expires_at: None,
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether this entry is expired as of `now`.
    ///
    /// The boundary instant counts as expired: `expires_at == now` is a
    /// miss. This is applied consistently on every read path.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(deadline) => deadline <= now,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_entry_without_expiry_never_expires() {
        let entry = CacheEntry::new("k", json!("v"));
        assert!(!entry.is_expired(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn test_entry_expiry_boundary_is_expired() {
        let now = Utc::now();
        let mut entry = CacheEntry::new("k", json!(1));
        entry.expires_at = Some(now);
        assert!(entry.is_expired(now));
        assert!(!entry.is_expired(now - Duration::milliseconds(1)));
    }

    #[test]
    fn test_entry_round_trips_through_json() {
        let mut entry = CacheEntry::new("user:42", json!({"name": "ada", "logins": [1, 2, 3]}));
        entry.tags = vec!["users".to_string(), "hot".to_string()];
        entry.expires_at = Some(Utc::now() + Duration::seconds(30));

        let bytes = serde_json::to_vec(&entry).expect("serialize should succeed");
        let back: CacheEntry = serde_json::from_slice(&bytes).expect("deserialize should succeed");
        assert_eq!(back, entry);
    }
}
