//! Per-call operation options.
//!
//! [`SetOptions`] is the only per-call configuration surface: an optional
//! TTL and a set of tags. Everything else a write does is driven by the
//! store's static configuration.

use std::time::Duration;

/// Options applied to a single `set` (or every entry of a `set_multiple`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Time-to-live for the written entry. `None` falls back to the store's
    /// configured default TTL; a store default of zero means never expires.
    pub ttl: Option<Duration>,

    /// Tags to associate with the written entry.
    pub tags: Vec<String>,
}

impl SetOptions {
    /// Create options with no TTL override and no tags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry's time-to-live.
    pub fn with_expiration(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Attach tags to the entry. Duplicates are collapsed by the store.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}
