//! Search builder for flexible configuration
//!
//! Combines a [`SearchConfig`] with an optional result cache and picks the
//! executor accordingly.

use crate::cache::CacheService;
use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::runner::{CachedRunner, Executor, TaskRunner};
use crate::search::GeoSearch;
use std::sync::Arc;
use std::time::Duration;

/// Builder for a [`GeoSearch`].
#[derive(Default)]
pub struct GeoSearchBuilder {
    config: SearchConfig,
    cache: Option<Arc<dyn CacheService>>,
}

impl GeoSearchBuilder {
    /// Create a new builder with the default configuration: whole globe, no cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the `"west,south,east,north"` box to search.
    pub fn bbox(mut self, bbox: impl Into<String>) -> Self {
        self.config.bbox = bbox.into();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.config.limit = limit;
        self
    }

    pub fn correction(mut self, passes: u8) -> Self {
        self.config.correction = passes;
        self
    }

    pub fn border(mut self, border: f64) -> Self {
        self.config.border = border;
        self
    }

    pub fn logging(mut self, logging: bool) -> Self {
        self.config.logging = logging;
        self
    }

    /// Cache results for `ttl`. Requires a cache service.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config = self.config.with_cache_ttl(ttl);
        self
    }

    /// Result cache to read from and write to.
    pub fn cache(mut self, cache: Arc<dyn CacheService>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate the configuration and build the search.
    ///
    /// Decomposition happens here, so an invalid box fails the build.
    pub fn build(self) -> Result<GeoSearch> {
        let executor: Box<dyn Executor> = match (self.cache, self.config.cache_ttl()) {
            (Some(cache), Some(ttl)) => {
                let runner = CachedRunner::new(cache, ttl);
                match &self.config.cache_namespace {
                    Some(namespace) => Box::new(runner.with_namespace(namespace.clone())),
                    None => Box::new(runner),
                }
            }
            (None, Some(_)) => {
                return Err(SearchError::InvalidConfig(
                    "a cache ttl needs a cache service".to_string(),
                ));
            }
            // A zero ttl disables caching even when a cache is supplied.
            (_, None) => Box::new(TaskRunner::new()),
        };

        GeoSearch::with_executor(self.config, executor)
    }
}

impl std::fmt::Debug for GeoSearchBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoSearchBuilder")
            .field("config", &self.config)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[test]
    fn test_builder_default() {
        let search = GeoSearchBuilder::new().build().unwrap();
        assert_eq!(search.boxes().len(), 1);
        assert_eq!(search.root().limit, 1000);
    }

    #[test]
    fn test_builder_overrides() {
        let search = GeoSearchBuilder::new()
            .bbox("-1,-1,1,1")
            .limit(40)
            .correction(1)
            .border(0.0)
            .logging(true)
            .build()
            .unwrap();

        assert!(search.config().logging);
        assert_eq!(search.boxes().len(), 4);
        assert_eq!(search.boxes().iter().map(|b| b.limit).sum::<usize>(), 40);
    }

    #[test]
    fn test_ttl_without_cache_is_rejected() {
        let result = GeoSearchBuilder::new()
            .cache_ttl(Duration::from_secs(60))
            .build();
        assert!(matches!(result, Err(SearchError::InvalidConfig(_))));
    }

    #[test]
    fn test_cache_with_ttl() {
        let search = GeoSearchBuilder::new()
            .bbox("10.02,50.01,10.04,50.03")
            .cache(Arc::new(MemoryCache::default()))
            .cache_ttl(Duration::from_secs(60))
            .build()
            .unwrap();
        assert!(search.config().caching());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(GeoSearchBuilder::new().correction(3).build().is_err());
        assert!(matches!(
            GeoSearchBuilder::new().bbox("1,2,3").build(),
            Err(SearchError::InvalidBoundingBox(_))
        ));
    }
}
