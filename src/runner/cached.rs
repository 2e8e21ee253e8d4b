//! Cache-aware execution on top of [`TaskRunner`].

use super::{Executor, RunStats, TaskRunner};
use crate::cache::CacheService;
use crate::store::RemoteStore;
use crate::task::{Task, TaskGroup};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Serves tasks from a [`CacheService`] where possible and runs the rest.
///
/// Lookups and writes are batched, one round trip each per run. Only chains
/// that finished without error are written back; a rejected write is logged
/// and never fails the run.
#[derive(Clone)]
pub struct CachedRunner {
    cache: Arc<dyn CacheService>,
    ttl: Duration,
    namespace: Option<String>,
    inner: TaskRunner,
}

impl CachedRunner {
    pub fn new(cache: Arc<dyn CacheService>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            namespace: None,
            inner: TaskRunner::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn store_results(&self, todo: &[&mut Task]) {
        let mut entries: Vec<(String, Bytes)> = Vec::new();
        for task in todo {
            let (Some(key), Some(payload)) = (task.cache_key(), task.cache_payload()) else {
                continue;
            };
            match payload {
                Ok(payload) => entries.push((key.to_string(), payload)),
                Err(err) => log::info!("not caching {key}: {err}"),
            }
        }
        if entries.is_empty() {
            return;
        }

        let staged = entries.len();
        let failed = self
            .cache
            .set_many(entries, self.ttl, self.namespace.as_deref());
        if failed.len() == staged {
            log::error!("cache rejected all {staged} writes");
        } else if !failed.is_empty() {
            log::info!(
                "cache rejected {} of {} writes: {}",
                failed.len(),
                staged,
                failed.join(", ")
            );
        }
    }
}

impl Executor for CachedRunner {
    fn run(&self, store: &dyn RemoteStore, group: &mut TaskGroup) -> RunStats {
        let keys: Vec<String> = group
            .iter()
            .filter(|task| !task.state().is_finished())
            .filter_map(|task| task.cache_key().map(str::to_string))
            .collect();
        let found = if keys.is_empty() {
            Default::default()
        } else {
            self.cache.get_many(&keys, self.namespace.as_deref())
        };

        let mut stats = RunStats::default();
        let mut todo: Vec<&mut Task> = Vec::with_capacity(group.len());
        for task in group.iter_mut() {
            if task.state().is_finished() {
                continue;
            }
            // Tasks sharing a key all take the same entry.
            let hit = task.cache_key().and_then(|key| found.get(key).cloned());
            match hit {
                Some(payload) => match task.restore_cached(payload) {
                    Ok(()) => stats.cache_hits += 1,
                    Err(err) => {
                        log::warn!(
                            "discarding undecodable cache entry {}: {err}",
                            task.cache_key().unwrap_or_default()
                        );
                        todo.push(task);
                    }
                },
                None => todo.push(task),
            }
        }
        log::debug!(
            "cache: {} hits, {} to run",
            stats.cache_hits,
            todo.len()
        );

        stats.merge(self.inner.run_tasks(store, &mut todo));
        self.store_results(&todo);
        stats
    }
}

impl std::fmt::Debug for CachedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRunner")
            .field("ttl", &self.ttl)
            .field("namespace", &self.namespace)
            .finish()
    }
}
