//! Cache backend implementations.
//!
//! Entries are write-once: [`CacheBackend::insert`] never replaces an existing
//! entry (first write wins). Replacing an expired entry means removing it
//! first, which [`CacheManager`](super::CacheManager) does on read through
//! [`CacheBackend::remove_stale`], so a fresh entry written in the meantime
//! by another caller survives.

use super::key::CacheKey;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A validated payload as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, payload: serde_json::Value) -> Self {
        Self {
            key,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Whether the entry is older than `ttl` at `now`. `None` never expires.
    pub fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        match ttl {
            None => false,
            Some(ttl) => (now - self.created_at)
                .to_std()
                .map(|age| age > ttl)
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An entry already existed under the key and was kept.
    AlreadyPresent,
    /// The entry was not stored (caching disabled, oversized, or a null backend).
    Skipped,
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;
    async fn insert(&self, entry: CacheEntry) -> Result<InsertOutcome>;
    async fn remove(&self, key: &CacheKey) -> Result<bool>;
    /// Remove the entry under `key` only if it is still the one created at
    /// `created_at`. Returns whether anything was removed.
    async fn remove_stale(&self, key: &CacheKey, created_at: DateTime<Utc>) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

/// In-process store, optionally bounded with least-recently-used eviction.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    /// Unbounded store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Store holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, CacheEntry>>> {
        self.entries.lock().map_err(|e| {
            Error::cache_with_context(
                format!("memory cache lock poisoned: {}", e),
                ErrorContext::new().with_source("memory_cache"),
            )
        })
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.lock()?.get(&key.hash).cloned())
    }

    async fn insert(&self, entry: CacheEntry) -> Result<InsertOutcome> {
        let mut entries = self.lock()?;
        if entries.contains(&entry.key.hash) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        entries.put(entry.key.hash.clone(), entry);
        Ok(InsertOutcome::Inserted)
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.lock()?.pop(&key.hash).is_some())
    }

    async fn remove_stale(&self, key: &CacheKey, created_at: DateTime<Utc>) -> Result<bool> {
        let mut entries = self.lock()?;
        let matches = entries
            .peek(&key.hash)
            .map(|e| e.created_at == created_at)
            .unwrap_or(false);
        if matches {
            entries.pop(&key.hash);
        }
        Ok(matches)
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Persistent store: one JSON document per entry under `root/<kind>/<hash>.json`.
///
/// Inserts write a temporary file and hard-link it into place, so readers
/// never observe a partial document and a concurrent second writer loses.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: &str) -> PathBuf {
        let safe: String = kind
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(if safe.is_empty() { "_".to_string() } else { safe })
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.kind_dir(&key.kind).join(format!("{}.json", key.hash))
    }

    /// Hidden per-call file next to the entry; never counted as an entry.
    fn scratch_path(&self, key: &CacheKey, suffix: &str) -> PathBuf {
        self.kind_dir(&key.kind)
            .join(format!(".{}.{}.{}", key.hash, uuid::Uuid::new_v4(), suffix))
    }

    fn corrupt(path: &Path, err: serde_json::Error) -> Error {
        Error::cache_with_context(
            "unreadable cache entry",
            ErrorContext::new()
                .with_field_path(path.display().to_string())
                .with_details(err.to_string())
                .with_source("file_cache"),
        )
    }
}

#[async_trait]
impl CacheBackend for FileCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Self::corrupt(&path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert(&self, entry: CacheEntry) -> Result<InsertOutcome> {
        let dir = self.kind_dir(&entry.key.kind);
        tokio::fs::create_dir_all(&dir).await?;

        let path = self.entry_path(&entry.key);
        let tmp = self.scratch_path(&entry.key, "tmp");
        if let Err(e) = tokio::fs::write(&tmp, serde_json::to_vec(&entry)?).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        let linked = tokio::fs::hard_link(&tmp, &path).await;
        let _ = tokio::fs::remove_file(&tmp).await;
        match linked {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(InsertOutcome::AlreadyPresent),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_stale(&self, key: &CacheKey, created_at: DateTime<Utc>) -> Result<bool> {
        let path = self.entry_path(key);
        // Move the entry aside first so the check and the removal see the same file.
        let tomb = self.scratch_path(key, "stale");
        match tokio::fs::rename(&path, &tomb).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let taken = match tokio::fs::read(&tomb).await {
            Ok(bytes) => serde_json::from_slice::<CacheEntry>(&bytes)
                .map(|e| e.created_at == created_at)
                .map_err(|e| Self::corrupt(&path, e)),
            Err(e) => Err(e.into()),
        };
        if !matches!(taken, Ok(true)) {
            // Put it back unless a newer entry has landed in the meantime.
            match tokio::fs::hard_link(&tomb, &path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }
        let _ = tokio::fs::remove_file(&tomb).await;
        taken
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn len(&self) -> Result<usize> {
        let mut kinds = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        while let Some(kind_dir) = kinds.next_entry().await? {
            if !kind_dir.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(kind_dir.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let name = file.file_name();
                let name = name.to_string_lossy();
                if name.ends_with(".json") && !name.starts_with('.') {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Stores nothing; every lookup misses.
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(None)
    }
    async fn insert(&self, _: CacheEntry) -> Result<InsertOutcome> {
        Ok(InsertOutcome::Skipped)
    }
    async fn remove(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn remove_stale(&self, _: &CacheKey, _: DateTime<Utc>) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(kind: &str, hash: &str, payload: serde_json::Value) -> CacheEntry {
        CacheEntry::new(CacheKey::new(kind, hash), payload)
    }

    #[tokio::test]
    async fn test_memory_first_write_wins() {
        let cache = MemoryCache::new();
        let first = entry("k", "h1", json!({"v": 1}));
        assert_eq!(cache.insert(first.clone()).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            cache.insert(entry("k", "h1", json!({"v": 2}))).await.unwrap(),
            InsertOutcome::AlreadyPresent
        );
        let stored = cache.get(&first.key).await.unwrap().unwrap();
        assert_eq!(stored.payload, json!({"v": 1}));
    }

    #[tokio::test]
    async fn test_memory_capacity_evicts_least_recent() {
        let cache = MemoryCache::with_capacity(2);
        cache.insert(entry("k", "a", json!(1))).await.unwrap();
        cache.insert(entry("k", "b", json!(2))).await.unwrap();
        // Touch "a" so "b" becomes the eviction candidate.
        cache.get(&CacheKey::new("k", "a")).await.unwrap();
        cache.insert(entry("k", "c", json!(3))).await.unwrap();

        assert_eq!(cache.len().await.unwrap(), 2);
        assert!(cache.get(&CacheKey::new("k", "b")).await.unwrap().is_none());
        assert!(cache.get(&CacheKey::new("k", "a")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_remove_and_clear() {
        let cache = MemoryCache::new();
        cache.insert(entry("k", "a", json!(1))).await.unwrap();
        assert!(cache.remove(&CacheKey::new("k", "a")).await.unwrap());
        assert!(!cache.remove(&CacheKey::new("k", "a")).await.unwrap());
        cache.insert(entry("k", "b", json!(2))).await.unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_round_trip_and_first_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let first = entry("practice_detail", "abc", json!({"title": "Box Breathing"}));

        assert!(cache.get(&first.key).await.unwrap().is_none());
        assert_eq!(cache.insert(first.clone()).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            cache
                .insert(entry("practice_detail", "abc", json!({"title": "Other"})))
                .await
                .unwrap(),
            InsertOutcome::AlreadyPresent
        );
        assert_eq!(cache.get(&first.key).await.unwrap(), Some(first));
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_file_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::new("hidden_wisdom", "xyz");
        FileCache::new(dir.path())
            .insert(CacheEntry::new(key.clone(), json!({"quote": "q"})))
            .await
            .unwrap();

        let reopened = FileCache::new(dir.path());
        assert_eq!(
            reopened.get(&key).await.unwrap().map(|e| e.payload),
            Some(json!({"quote": "q"}))
        );
        assert!(reopened.remove(&key).await.unwrap());
        assert_eq!(reopened.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_corrupt_entry_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key = CacheKey::new("k", "bad");
        std::fs::create_dir_all(dir.path().join("k")).unwrap();
        std::fs::write(dir.path().join("k").join("bad.json"), b"{not json").unwrap();
        assert!(matches!(cache.get(&key).await, Err(Error::Cache { .. })));
    }

    #[tokio::test]
    async fn test_null_cache_never_stores() {
        let cache = NullCache::new();
        let e = entry("k", "a", json!(1));
        assert_eq!(cache.insert(e.clone()).await.unwrap(), InsertOutcome::Skipped);
        assert!(cache.get(&e.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_remove_stale_keeps_replacement() {
        let cache = MemoryCache::new();
        let fresh = entry("k", "a", json!("fresh"));
        cache.insert(fresh.clone()).await.unwrap();

        let earlier = fresh.created_at - chrono::Duration::seconds(3600);
        assert!(!cache.remove_stale(&fresh.key, earlier).await.unwrap());
        assert_eq!(cache.get(&fresh.key).await.unwrap(), Some(fresh.clone()));

        assert!(cache.remove_stale(&fresh.key, fresh.created_at).await.unwrap());
        assert!(cache.get(&fresh.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_remove_stale_keeps_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let fresh = entry("k", "a", json!("fresh"));
        cache.insert(fresh.clone()).await.unwrap();

        let earlier = fresh.created_at - chrono::Duration::seconds(3600);
        assert!(!cache.remove_stale(&fresh.key, earlier).await.unwrap());
        assert_eq!(cache.get(&fresh.key).await.unwrap(), Some(fresh.clone()));
        assert!(scratch_files(dir.path().join("k")).is_empty());

        assert!(cache.remove_stale(&fresh.key, fresh.created_at).await.unwrap());
        assert!(cache.get(&fresh.key).await.unwrap().is_none());
        assert!(!cache.remove_stale(&fresh.key, fresh.created_at).await.unwrap());
        assert!(scratch_files(dir.path().join("k")).is_empty());
    }

    fn scratch_files(dir: std::path::PathBuf) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|f| f.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with('.'))
            .collect()
    }

    #[tokio::test]
    async fn test_file_insert_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        cache.insert(entry("k", "a", json!(1))).await.unwrap();
        cache.insert(entry("k", "a", json!(2))).await.unwrap();
        assert!(scratch_files(dir.path().join("k")).is_empty());
    }

    #[tokio::test]
    async fn test_file_insert_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the kind directory should be.
        std::fs::write(dir.path().join("k"), b"").unwrap();
        let cache = FileCache::new(dir.path());
        assert!(cache.insert(entry("k", "a", json!(1))).await.is_err());
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[test]
    fn test_expiry() {
        let e = entry("k", "a", json!(1));
        let later = e.created_at + chrono::Duration::seconds(120);
        assert!(!e.is_expired(None, later));
        assert!(!e.is_expired(Some(Duration::from_secs(300)), later));
        assert!(e.is_expired(Some(Duration::from_secs(60)), later));
    }
}
