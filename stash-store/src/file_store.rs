//! File-backed cache store.
//!
//! Maps each key to exactly one file under a configured root directory.
//! Entries are serialized as one JSON [`CacheEntry`] record per file and
//! committed with a temp-file-plus-rename sequence, so a reader never
//! observes a half-written entry: the atomic rename is the sole commit
//! point, even for external processes touching the same directory.
//!
//! # Filenames
//!
//! Keys are sanitized for the filesystem and suffixed with a truncated
//! SHA-256 digest of the raw key, so two distinct keys can never collide
//! on the same filename.
//!
//! # Tag index durability
//!
//! The tag index lives in memory only. It is rebuilt from the entry files
//! at construction, so a crash between a file rename and the index update
//! heals on the next startup.
//!
//! # Locking
//!
//! One `RwLock` per store guards the tag index and every read-modify-write
//! sequence. Readers run concurrently; writers (including `increment`,
//! which holds the write lock across its whole read-modify-write) are
//! mutually exclusive. The background sweep takes the writer lock per file,
//! never for the whole directory scan.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use stash_core::{
    CacheEntry, CacheError, CacheResult, ConfigError, SetOptions, StoreConfig, StoreError,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};

use crate::store::Store;
use crate::tag_index::TagIndex;

/// Default filename extension for entry files.
pub const DEFAULT_EXTENSION: &str = "cache";

/// Default interval between background expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Sanitized key stems longer than this are truncated; the digest suffix
/// keeps truncated names unique.
const MAX_STEM_LEN: usize = 100;

/// Hex characters of the SHA-256 digest appended to every filename.
const DIGEST_CHARS: usize = 16;

/// Outcome of reading a single entry file.
enum FileRead {
    Absent,
    Corrupt,
    Entry(CacheEntry),
}

/// Removes a temporary file unless the write reached its rename.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Durable [`Store`] persisting one file per key.
pub struct FileStore {
    root: PathBuf,
    extension: String,
    default_ttl: Option<Duration>,
    /// Guards the tag index and every read-modify-write sequence.
    index: RwLock<TagIndex>,
    shutdown: watch::Sender<bool>,
    temp_counter: AtomicU64,
}

impl FileStore {
    /// Open a file store from its driver configuration.
    ///
    /// Recognized driver options:
    ///
    /// - `root` (required): directory holding the entry files, created if
    ///   missing.
    /// - `extension`: filename extension, default `"cache"`.
    /// - `sweep_interval_secs`: background sweep period, default 60.
    ///
    /// Rebuilds the tag index by scanning the root directory, removing any
    /// expired or corrupt files and stray temp files found there, then
    /// spawns the periodic sweep task. Must be called within a Tokio
    /// runtime.
    pub async fn open(config: &StoreConfig) -> CacheResult<Arc<Self>> {
        let root = config
            .option_str("root")
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "options.root".to_string(),
                reason: "file driver requires a root directory".to_string(),
            })?;
        let root = PathBuf::from(root);
        let extension = config
            .option_str("extension")
            .unwrap_or(DEFAULT_EXTENSION)
            .trim_start_matches('.')
            .to_string();
        let sweep_every = Duration::from_secs(
            config
                .option_u64("sweep_interval_secs")
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
                .max(1),
        );

        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| CacheError::backend(root.display().to_string(), e))?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let store = Arc::new(Self {
            root,
            extension,
            default_ttl: config.default_ttl(),
            index: RwLock::new(TagIndex::new()),
            shutdown,
            temp_counter: AtomicU64::new(0),
        });

        store.rebuild_index().await?;
        spawn_sweep(&store, sweep_every, shutdown_rx);
        Ok(store)
    }

    /// Sanitize a key into a collision-free filename stem.
    ///
    /// Path separators and characters outside `[A-Za-z0-9._-]` become `_`;
    /// a truncated SHA-256 digest of the raw key is appended so distinct
    /// keys that sanitize identically still get distinct files.
    fn sanitize_key(key: &str) -> String {
        let mut stem: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        stem.truncate(MAX_STEM_LEN);

        let digest = Sha256::digest(key.as_bytes());
        let suffix = &hex::encode(digest)[..DIGEST_CHARS];
        format!("{stem}-{suffix}")
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", Self::sanitize_key(key), self.extension))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!("{}.{n}.tmp", Self::sanitize_key(key)))
    }

    /// Read and parse one entry file. Never mutates anything.
    async fn read_entry(path: &Path) -> CacheResult<FileRead> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileRead::Absent),
            Err(e) => return Err(CacheError::backend(path.display().to_string(), e)),
        };
        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => Ok(FileRead::Entry(entry)),
            Err(_) => Ok(FileRead::Corrupt),
        }
    }

    async fn remove_file_if_exists(path: &Path) -> CacheResult<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::backend(path.display().to_string(), e)),
        }
    }

    /// Commit one entry to disk. Caller must hold the write lock.
    ///
    /// Writes to a fresh temp file in the same directory, flushes it to
    /// stable storage, then atomically renames it over the target. The
    /// guard removes the temp file on any failure or cancellation before
    /// the rename.
    async fn write_entry(&self, entry: &CacheEntry) -> CacheResult<()> {
        let bytes = serde_json::to_vec(entry).map_err(|e| StoreError::Serialization {
            key: entry.key.clone(),
            reason: e.to_string(),
        })?;

        let target = self.entry_path(&entry.key);
        let temp = self.temp_path(&entry.key);
        let mut guard = TempFileGuard::new(temp.clone());

        let map_err = |e: std::io::Error| CacheError::backend(temp.display().to_string(), e);
        let mut file = tokio::fs::File::create(&temp).await.map_err(map_err)?;
        file.write_all(&bytes).await.map_err(map_err)?;
        file.sync_all().await.map_err(map_err)?;
        drop(file);

        tokio::fs::rename(&temp, &target)
            .await
            .map_err(|e| CacheError::backend(target.display().to_string(), e))?;
        guard.disarm();
        Ok(())
    }

    /// Load the live entry under `key`, lazily removing it when expired or
    /// corrupt. Takes the read lock for the common path and escalates to
    /// the write lock only when removal is needed.
    async fn load_live(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let path = self.entry_path(key);
        {
            let _read = self.index.read().await;
            match Self::read_entry(&path).await? {
                FileRead::Entry(entry) if !entry.is_expired(Utc::now()) => {
                    return Ok(Some(entry))
                }
                FileRead::Absent => return Ok(None),
                _ => {}
            }
        }

        // Expired or corrupt: re-check under the write lock, then remove.
        let mut index = self.index.write().await;
        match Self::read_entry(&path).await? {
            FileRead::Entry(entry) if !entry.is_expired(Utc::now()) => Ok(Some(entry)),
            FileRead::Absent => Ok(None),
            _ => {
                Self::remove_file_if_exists(&path).await?;
                index.remove_key(key);
                Ok(None)
            }
        }
    }

    /// All entry-file paths under the root with the configured extension.
    async fn list_entry_paths(&self) -> CacheResult<Vec<PathBuf>> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| CacheError::backend(self.root.display().to_string(), e))?;
        let mut paths = Vec::new();
        loop {
            let next = dir
                .next_entry()
                .await
                .map_err(|e| CacheError::backend(self.root.display().to_string(), e))?;
            let Some(item) = next else { break };
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str()) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Scan the root directory and rebuild the tag index, removing expired
    /// and corrupt files and leftover temp files from a previous crash.
    async fn rebuild_index(&self) -> CacheResult<()> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| CacheError::backend(self.root.display().to_string(), e))?;
        let mut index = self.index.write().await;
        let now = Utc::now();

        loop {
            let next = dir
                .next_entry()
                .await
                .map_err(|e| CacheError::backend(self.root.display().to_string(), e))?;
            let Some(item) = next else { break };
            let path = item.path();
            let ext = path.extension().and_then(|e| e.to_str());

            if ext == Some("tmp") {
                let _ = Self::remove_file_if_exists(&path).await;
                continue;
            }
            if ext != Some(self.extension.as_str()) {
                continue;
            }
            match Self::read_entry(&path).await? {
                FileRead::Entry(entry) if !entry.is_expired(now) => {
                    index.add_tags(&entry.key, &entry.tags);
                }
                FileRead::Entry(_) => {
                    Self::remove_file_if_exists(&path).await?;
                }
                FileRead::Corrupt => {
                    tracing::warn!(path = %path.display(), "Removing corrupt cache file");
                    Self::remove_file_if_exists(&path).await?;
                }
                FileRead::Absent => {}
            }
        }
        Ok(())
    }

    /// One full expiry sweep. Lists files without the lock, then takes the
    /// writer lock per file, so foreground operations are never starved
    /// for the whole scan. When a shutdown receiver is supplied, the pass
    /// stops promptly between files once it fires.
    async fn sweep_pass(&self, shutdown: Option<&watch::Receiver<bool>>) -> CacheResult<u64> {
        let paths = self.list_entry_paths().await?;
        let mut removed = 0u64;

        for path in paths {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                break;
            }
            let mut index = self.index.write().await;
            match Self::read_entry(&path).await {
                Ok(FileRead::Entry(entry)) if !entry.is_expired(Utc::now()) => {}
                Ok(FileRead::Entry(entry)) => {
                    if Self::remove_file_if_exists(&path).await? {
                        removed += 1;
                    }
                    index.remove_key(&entry.key);
                }
                Ok(FileRead::Corrupt) => {
                    tracing::warn!(path = %path.display(), "Removing corrupt cache file");
                    if Self::remove_file_if_exists(&path).await? {
                        removed += 1;
                    }
                }
                Ok(FileRead::Absent) => {}
                Err(e) => {
                    // One bad file must never stop the sweep.
                    tracing::warn!(path = %path.display(), error = %e, "Sweep skipping unreadable file");
                }
            }
        }

        // Prune index links whose entry file is gone (e.g. a corrupt file
        // removed above, whose key cannot be recovered from its name).
        let mut index = self.index.write().await;
        for key in index.keys() {
            if !self.entry_path(&key).exists() {
                index.remove_key(&key);
            }
        }
        Ok(removed)
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Spawn the periodic sweep task for a store.
///
/// The task holds only a weak reference, so dropping the last `Arc` ends
/// it; `close()` ends it explicitly via the shutdown channel.
fn spawn_sweep(store: &Arc<FileStore>, every: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let weak = Arc::downgrade(store);
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!("Cache sweep task shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let Some(store) = weak.upgrade() else { break };
                    match store.sweep_pass(Some(&shutdown_rx)).await {
                        Ok(removed) if removed > 0 => {
                            tracing::debug!(removed, "Expiry sweep removed entries");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "Expiry sweep failed"),
                    }
                }
            }
        }
    });
}

fn expiry_from(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.and_then(|t| chrono::Duration::from_std(t).ok().map(|d| now + d))
}

fn dedup_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .filter(|t| !t.is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        Ok(self.load_live(key).await?.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Value, options: SetOptions) -> CacheResult<()> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        let now = Utc::now();
        let tags = dedup_tags(&options.tags);
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            expires_at: expiry_from(now, options.ttl.or(self.default_ttl)),
            tags: tags.clone(),
            created_at: now,
        };

        let mut index = self.index.write().await;
        self.write_entry(&entry).await?;
        index.remove_key(key);
        index.add_tags(key, &tags);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        let mut index = self.index.write().await;
        Self::remove_file_if_exists(&self.entry_path(key)).await?;
        index.remove_key(key);
        Ok(())
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        Ok(self.load_live(key).await?.is_some())
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut index = self.index.write().await;
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| CacheError::backend(self.root.display().to_string(), e))?;
        loop {
            let next = dir
                .next_entry()
                .await
                .map_err(|e| CacheError::backend(self.root.display().to_string(), e))?;
            let Some(item) = next else { break };
            let path = item.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if ext == Some(self.extension.as_str()) || ext == Some("tmp") {
                Self::remove_file_if_exists(&path).await?;
            }
        }
        index.clear();
        Ok(())
    }

    async fn get_multiple(&self, keys: &[String]) -> CacheResult<HashMap<String, Value>> {
        let mut found = HashMap::new();
        for key in keys {
            if key.is_empty() {
                continue;
            }
            if let Some(entry) = self.load_live(key).await? {
                found.insert(key.clone(), entry.value);
            }
        }
        Ok(found)
    }

    async fn set_multiple(
        &self,
        entries: HashMap<String, Value>,
        options: SetOptions,
    ) -> CacheResult<()> {
        for (key, value) in entries {
            if key.is_empty() {
                continue;
            }
            self.set(&key, value, options.clone()).await?;
        }
        Ok(())
    }

    async fn delete_multiple(&self, keys: &[String]) -> CacheResult<()> {
        for key in keys {
            if key.is_empty() {
                continue;
            }
            self.delete(key).await?;
        }
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        if key.is_empty() {
            return Err(CacheError::invalid_key(key));
        }
        let path = self.entry_path(key);
        let mut index = self.index.write().await;
        let now = Utc::now();

        let prior = match Self::read_entry(&path).await? {
            FileRead::Entry(entry) if !entry.is_expired(now) => Some(entry),
            FileRead::Absent => None,
            _ => {
                Self::remove_file_if_exists(&path).await?;
                index.remove_key(key);
                None
            }
        };

        let (current, expires_at, tags, created_at) = match &prior {
            Some(entry) => {
                let n = entry.value.as_i64().ok_or_else(|| StoreError::NonNumericValue {
                    key: key.to_string(),
                })?;
                (n, entry.expires_at, entry.tags.clone(), entry.created_at)
            }
            None => (0, expiry_from(now, self.default_ttl), Vec::new(), now),
        };

        let updated = current.saturating_add(delta);
        let entry = CacheEntry {
            key: key.to_string(),
            value: Value::from(updated),
            expires_at,
            tags: tags.clone(),
            created_at,
        };
        self.write_entry(&entry).await?;
        index.remove_key(key);
        index.add_tags(key, &tags);
        Ok(updated)
    }

    async fn tagged_get(&self, tag: &str) -> CacheResult<HashMap<String, Value>> {
        let keys: Vec<String> = {
            let index = self.index.read().await;
            index.keys_for_tag(tag).into_iter().collect()
        };
        let mut found = HashMap::new();
        for key in keys {
            if let Some(entry) = self.load_live(&key).await? {
                found.insert(key, entry.value);
            }
        }
        Ok(found)
    }

    async fn tagged_delete(&self, tag: &str) -> CacheResult<()> {
        let mut index = self.index.write().await;
        for key in index.keys_for_tag(tag) {
            Self::remove_file_if_exists(&self.entry_path(&key)).await?;
            index.remove_key(&key);
        }
        index.remove_tag(tag);
        Ok(())
    }

    async fn count(&self) -> CacheResult<u64> {
        let _read = self.index.read().await;
        let now = Utc::now();
        let mut live = 0u64;
        for path in self.list_entry_paths().await? {
            if let Ok(FileRead::Entry(entry)) = Self::read_entry(&path).await {
                if !entry.is_expired(now) {
                    live += 1;
                }
            }
        }
        Ok(live)
    }

    async fn flush(&self) -> CacheResult<u64> {
        self.sweep_pass(None).await
    }

    async fn close(&self) -> CacheResult<()> {
        let _ = self.shutdown.send(true);
        Ok(())
    }
}
