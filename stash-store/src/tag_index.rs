//! Bidirectional tag/key index.
//!
//! Pure in-memory structure, no I/O. Each store instance owns exactly one
//! index; it is never shared across stores. The index maintains two maps,
//! tag to key set and key to tag set, and restores three invariants after
//! every mutation:
//!
//! 1. Symmetry: `key ∈ tag_to_keys[tag]` iff `tag ∈ key_to_tags[key]`.
//! 2. No tag maps to an empty key set.
//! 3. No key maps to an empty tag set.

use std::collections::{HashMap, HashSet};

/// In-memory bidirectional mapping between tags and keys.
#[derive(Debug, Default)]
pub struct TagIndex {
    tag_to_keys: HashMap<String, HashSet<String>>,
    key_to_tags: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `key` with every tag in `tags`.
    pub fn add_tags<S: AsRef<str>>(&mut self, key: &str, tags: &[S]) {
        for tag in tags {
            let tag = tag.as_ref();
            if tag.is_empty() {
                continue;
            }
            self.tag_to_keys
                .entry(tag.to_string())
                .or_default()
                .insert(key.to_string());
            self.key_to_tags
                .entry(key.to_string())
                .or_default()
                .insert(tag.to_string());
        }
    }

    /// Remove the association between `key` and every tag in `tags`,
    /// pruning now-empty sets.
    pub fn remove_tags<S: AsRef<str>>(&mut self, key: &str, tags: &[S]) {
        for tag in tags {
            let tag = tag.as_ref();
            if let Some(keys) = self.tag_to_keys.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_to_keys.remove(tag);
                }
            }
            if let Some(key_tags) = self.key_to_tags.get_mut(key) {
                key_tags.remove(tag);
                if key_tags.is_empty() {
                    self.key_to_tags.remove(key);
                }
            }
        }
    }

    /// All keys currently associated with `tag`.
    pub fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.tag_to_keys.get(tag).cloned().unwrap_or_default()
    }

    /// All tags currently associated with `key`.
    pub fn tags_for_key(&self, key: &str) -> HashSet<String> {
        self.key_to_tags.get(key).cloned().unwrap_or_default()
    }

    /// Drop `tag` and every key link referencing it.
    pub fn remove_tag(&mut self, tag: &str) {
        if let Some(keys) = self.tag_to_keys.remove(tag) {
            for key in keys {
                if let Some(key_tags) = self.key_to_tags.get_mut(&key) {
                    key_tags.remove(tag);
                    if key_tags.is_empty() {
                        self.key_to_tags.remove(&key);
                    }
                }
            }
        }
    }

    /// Drop `key` and every tag link referencing it.
    pub fn remove_key(&mut self, key: &str) {
        if let Some(tags) = self.key_to_tags.remove(key) {
            for tag in tags {
                if let Some(keys) = self.tag_to_keys.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.tag_to_keys.remove(&tag);
                    }
                }
            }
        }
    }

    /// Every key that currently has at least one tag link.
    pub fn keys(&self) -> Vec<String> {
        self.key_to_tags.keys().cloned().collect()
    }

    /// Whether the index holds no links at all.
    pub fn is_empty(&self) -> bool {
        self.tag_to_keys.is_empty() && self.key_to_tags.is_empty()
    }

    /// Drop every link.
    pub fn clear(&mut self) {
        self.tag_to_keys.clear();
        self.key_to_tags.clear();
    }
}
