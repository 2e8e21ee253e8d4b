//! In-process cache with LRU eviction and per-entry TTL.

use super::CacheService;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Largest value accepted by default, matching common memcache limits.
pub const DEFAULT_MAX_VALUE_BYTES: usize = 1024 * 1024;

type EntryKey = (Option<String>, String);

struct CacheEntry {
    value: Bytes,
    /// `None` never expires
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub rejected: u64,
}

pub struct MemoryCache {
    inner: Mutex<LruCache<EntryKey, CacheEntry>>,
    max_value_bytes: usize,
    stats: Mutex<CacheStats>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Refuse values larger than `max_value_bytes`.
    pub fn with_max_value_bytes(mut self, max_value_bytes: usize) -> Self {
        self.max_value_bytes = max_value_bytes;
        self
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl CacheService for MemoryCache {
    fn get_many(&self, keys: &[String], namespace: Option<&str>) -> HashMap<String, Bytes> {
        let now = Instant::now();
        let mut cache = self.inner.lock();
        let mut found = HashMap::with_capacity(keys.len());
        let mut misses = 0;

        for key in keys {
            let entry_key = (namespace.map(str::to_string), key.clone());
            let expired = match cache.get(&entry_key) {
                Some(entry) if !entry.is_expired_at(now) => {
                    found.insert(key.clone(), entry.value.clone());
                    false
                }
                Some(_) => true,
                None => {
                    misses += 1;
                    false
                }
            };
            if expired {
                cache.pop(&entry_key);
                misses += 1;
            }
        }

        let mut stats = self.stats.lock();
        stats.hits += found.len() as u64;
        stats.misses += misses;
        found
    }

    fn set_many(
        &self,
        entries: Vec<(String, Bytes)>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> Vec<String> {
        // A zero ttl stores without expiry.
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        let mut cache = self.inner.lock();
        let mut failed = Vec::new();
        let mut written = 0;

        for (key, value) in entries {
            if value.len() > self.max_value_bytes {
                failed.push(key);
                continue;
            }
            cache.put(
                (namespace.map(str::to_string), key),
                CacheEntry { value, expires_at },
            );
            written += 1;
        }

        let mut stats = self.stats.lock();
        stats.rejected += failed.len() as u64;
        stats.writes += written;
        failed
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("len", &self.len())
            .field("max_value_bytes", &self.max_value_bytes)
            .finish()
    }
}
