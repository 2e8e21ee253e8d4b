//! Result cache service abstraction.
//!
//! The cache is an independent key-value service accessed with batched,
//! idempotent reads and writes. Writes are best effort: an implementation
//! reports the keys it refused instead of failing the batch.

use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

mod memory;

pub use memory::{CacheStats, MemoryCache};

pub trait CacheService {
    /// Look up every key at once. Missing or expired keys are simply absent.
    fn get_many(&self, keys: &[String], namespace: Option<&str>) -> HashMap<String, Bytes>;

    /// Store every entry with the given time to live and return the keys that
    /// could not be stored.
    fn set_many(
        &self,
        entries: Vec<(String, Bytes)>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> Vec<String>;
}

impl<C: CacheService + ?Sized> CacheService for std::sync::Arc<C> {
    fn get_many(&self, keys: &[String], namespace: Option<&str>) -> HashMap<String, Bytes> {
        (**self).get_many(keys, namespace)
    }

    fn set_many(
        &self,
        entries: Vec<(String, Bytes)>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> Vec<String> {
        (**self).set_many(entries, ttl, namespace)
    }
}
