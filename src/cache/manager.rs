//! Cache manager.

use super::backend::{CacheBackend, CacheEntry, InsertOutcome};
use super::key::CacheKey;
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Expiry for kinds without an override; `None` keeps entries forever.
    pub default_ttl: Option<Duration>,
    pub kind_ttls: HashMap<String, Duration>,
    /// Serialized payloads larger than this are returned but not stored.
    pub max_entry_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: None,
            kind_ttls: HashMap::new(),
            max_entry_size: 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn with_kind_ttl(mut self, kind: impl Into<String>, ttl: Duration) -> Self {
        self.kind_ttls.insert(kind.into(), ttl);
        self
    }

    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes;
        self
    }

    pub fn ttl_for(&self, kind: &str) -> Option<Duration> {
        self.kind_ttls.get(kind).copied().or(self.default_ttl)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub inserts: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    inserts: AtomicU64,
    duplicates: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Front for a [`CacheBackend`] that applies expiry, size limits and statistics.
pub struct CacheManager {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
    stats: AtomicStats,
}

impl CacheManager {
    pub fn new(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            stats: AtomicStats::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Fetch a live entry. Expired entries are removed and reported as misses;
    /// an entry another caller wrote after this read is left in place.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        if !self.config.enabled {
            return Ok(None);
        }
        match self.backend.get(key).await {
            Ok(Some(entry)) => {
                if entry.is_expired(self.config.ttl_for(&key.kind), Utc::now()) {
                    debug!(kind = %key.kind, key = %key.hash, "cache entry expired");
                    AtomicStats::bump(&self.stats.expired);
                    AtomicStats::bump(&self.stats.misses);
                    self.tracked(self.backend.remove_stale(key, entry.created_at).await)?;
                    return Ok(None);
                }
                AtomicStats::bump(&self.stats.hits);
                Ok(Some(entry))
            }
            Ok(None) => {
                AtomicStats::bump(&self.stats.misses);
                Ok(None)
            }
            Err(e) => {
                AtomicStats::bump(&self.stats.errors);
                Err(e)
            }
        }
    }

    /// Store a validated payload under `key`.
    pub async fn store(&self, key: CacheKey, payload: serde_json::Value) -> Result<InsertOutcome> {
        if !self.config.enabled {
            return Ok(InsertOutcome::Skipped);
        }
        let size = serde_json::to_vec(&payload)?.len();
        if size > self.config.max_entry_size {
            debug!(kind = %key.kind, size, "payload exceeds max entry size, not cached");
            AtomicStats::bump(&self.stats.skipped);
            return Ok(InsertOutcome::Skipped);
        }

        let outcome = self.tracked(self.backend.insert(CacheEntry::new(key, payload)).await)?;
        match outcome {
            InsertOutcome::Inserted => AtomicStats::bump(&self.stats.inserts),
            InsertOutcome::AlreadyPresent => AtomicStats::bump(&self.stats.duplicates),
            InsertOutcome::Skipped => AtomicStats::bump(&self.stats.skipped),
        }
        Ok(outcome)
    }

    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        self.tracked(self.backend.remove(key).await)
    }

    pub async fn clear(&self) -> Result<()> {
        self.tracked(self.backend.clear().await)
    }

    pub async fn len(&self) -> Result<usize> {
        self.tracked(self.backend.len().await)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn tracked<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            AtomicStats::bump(&self.stats.errors);
        }
        result
    }
}
