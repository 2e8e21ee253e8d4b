//! Search configuration.

use crate::bbox::MAX_GEOHASH_PRECISION;
use crate::split::MAX_CORRECTION_PASSES;
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of one geographic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// `"west,south,east,north"` in degrees; `west > east` crosses the antimeridian
    #[serde(default = "SearchConfig::default_bbox")]
    pub bbox: String,

    /// Maximum number of records returned across all sub-queries
    #[serde(default = "SearchConfig::default_limit")]
    pub limit: usize,

    /// Correction passes over the decomposition (0-2)
    #[serde(default)]
    pub correction: u8,

    /// Fraction of a box below which a fault crossing is nudged instead of split
    #[serde(default = "SearchConfig::default_border")]
    pub border: f64,

    /// Result cache time to live; 0 disables caching
    #[serde(default)]
    pub cache_ttl_seconds: u64,

    /// Record the decomposition log alongside the results
    #[serde(default)]
    pub logging: bool,

    /// Geohash length of the query intervals (1-12)
    #[serde(default = "SearchConfig::default_geohash_precision")]
    pub geohash_precision: usize,

    /// Deadline handed to every remote call
    #[serde(default)]
    pub deadline_ms: Option<u64>,

    /// Cache namespace, shared by every key of this search
    #[serde(default)]
    pub cache_namespace: Option<String>,
}

impl SearchConfig {
    fn default_bbox() -> String {
        "-180,-90,180,90".to_string()
    }

    const fn default_limit() -> usize {
        1000
    }

    const fn default_border() -> f64 {
        0.15
    }

    const fn default_geohash_precision() -> usize {
        MAX_GEOHASH_PRECISION
    }

    pub fn new(bbox: impl Into<String>) -> Self {
        Self {
            bbox: bbox.into(),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_correction(mut self, passes: u8) -> Self {
        self.correction = passes;
        self
    }

    pub fn with_border(mut self, border: f64) -> Self {
        self.border = border;
        self
    }

    /// Cache results for `ttl`, rounded down to whole seconds.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_seconds = ttl.as_secs();
        self
    }

    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_geohash_precision(mut self, precision: usize) -> Self {
        self.geohash_precision = precision;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_cache_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache_namespace = Some(namespace.into());
        self
    }

    /// Whether results should go through the cache.
    pub fn caching(&self) -> bool {
        self.cache_ttl_seconds > 0
    }

    /// Get the cache ttl as Duration
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.caching()
            .then(|| Duration::from_secs(self.cache_ttl_seconds))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.correction > MAX_CORRECTION_PASSES {
            return Err(format!(
                "Correction passes must be between 0 and {MAX_CORRECTION_PASSES}"
            ));
        }

        if !self.border.is_finite() || !(0.0..=0.5).contains(&self.border) {
            return Err("Border fraction must be between 0.0 and 0.5".to_string());
        }

        if !(1..=MAX_GEOHASH_PRECISION).contains(&self.geohash_precision) {
            return Err(format!(
                "Geohash precision must be between 1 and {MAX_GEOHASH_PRECISION}"
            ));
        }

        if self.bbox.trim().is_empty() {
            return Err("Bounding box must not be empty".to_string());
        }

        if let Some(namespace) = &self.cache_namespace
            && namespace.is_empty()
        {
            return Err("Cache namespace must not be empty".to_string());
        }

        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: SearchConfig = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: SearchConfig = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bbox: Self::default_bbox(),
            limit: Self::default_limit(),
            correction: 0,
            border: Self::default_border(),
            cache_ttl_seconds: 0,
            logging: false,
            geohash_precision: Self::default_geohash_precision(),
            deadline_ms: None,
            cache_namespace: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SearchConfig::default();
        assert_eq!(config.bbox, "-180,-90,180,90");
        assert_eq!(config.limit, 1000);
        assert_eq!(config.correction, 0);
        assert_eq!(config.border, 0.15);
        assert!(!config.caching());
        assert!(!config.logging);
        assert_eq!(config.geohash_precision, 12);
        assert!(config.deadline().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_missing_fields_take_defaults() {
        let config = SearchConfig::from_json(r#"{"bbox": "10,40,20,50", "limit": 50}"#).unwrap();
        assert_eq!(config.bbox, "10,40,20,50");
        assert_eq!(config.limit, 50);
        assert_eq!(config.border, 0.15);
        assert!(config.cache_ttl().is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = SearchConfig::new("170,-10,-170,10")
            .with_limit(200)
            .with_correction(2)
            .with_border(0.1)
            .with_cache_ttl(Duration::from_secs(300))
            .with_logging(true)
            .with_deadline(Duration::from_millis(1500))
            .with_cache_namespace("geo");

        let json = config.to_json().unwrap();
        let deserialized = SearchConfig::from_json(&json).unwrap();

        assert_eq!(deserialized, config);
        assert_eq!(deserialized.cache_ttl(), Some(Duration::from_secs(300)));
        assert_eq!(deserialized.deadline(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_config_validation() {
        assert!(SearchConfig::default().with_correction(3).validate().is_err());
        assert!(SearchConfig::default().with_border(0.6).validate().is_err());
        assert!(SearchConfig::default().with_border(f64::NAN).validate().is_err());
        assert!(
            SearchConfig::default()
                .with_geohash_precision(0)
                .validate()
                .is_err()
        );
        assert!(SearchConfig::new(" ").validate().is_err());
        assert!(SearchConfig::default().with_cache_namespace("").validate().is_err());
        assert!(SearchConfig::from_json(r#"{"correction": 5}"#).is_err());
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_toml() {
        let config = SearchConfig::default().with_limit(10).with_correction(1);
        let text = config.to_toml().unwrap();
        assert_eq!(SearchConfig::from_toml(&text).unwrap(), config);
    }
}
