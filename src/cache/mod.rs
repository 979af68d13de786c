//! Generation cache: deterministic keys, write-once entries, pluggable stores.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheKeyGenerator`] | Derives a [`CacheKey`] from a kind and its [`CacheParams`] |
//! | [`CacheBackend`] | Lookup/insert store trait (first write wins) |
//! | [`MemoryCache`] | In-process store, optionally LRU-bounded |
//! | [`FileCache`] | Persistent store, one JSON document per entry |
//! | [`NullCache`] | Stores nothing |
//! | [`CacheManager`] | Per-kind expiry, size limits and statistics |
//!
//! ## Example
//!
//! ```rust
//! use aion_generation::cache::{CacheConfig, CacheKeyGenerator, CacheManager, CacheParams, MemoryCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let keys = CacheKeyGenerator::new();
//! let key = keys.generate(
//!     "practice_detail",
//!     &CacheParams::new().with("moduleId", "breathwork").with("level", "Beginner"),
//! );
//! assert_eq!(key.kind, "practice_detail");
//!
//! let config = CacheConfig::new().with_kind_ttl("hidden_wisdom", Duration::from_secs(86_400));
//! let cache = CacheManager::new(config, Arc::new(MemoryCache::new()));
//! assert_eq!(cache.backend_name(), "memory");
//! ```

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, CacheEntry, FileCache, InsertOutcome, MemoryCache, NullCache};
pub use key::{CacheKey, CacheKeyGenerator, CacheParams, ParamValue};
pub use manager::{CacheConfig, CacheManager, CacheStats};
