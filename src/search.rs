//! Bounding box search over a geohash range store.
//!
//! [`GeoSearch`] decomposes the configured box once, at construction. Each
//! call to [`GeoSearch::search`] binds the decomposition into one range query
//! per box and runs them together through the configured executor.

use crate::bbox::BoundingBox;
use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::predicate::{GEOHASH_PROPERTY, Predicate};
use crate::runner::{Executor, RunStats, TaskRunner};
use crate::split::BoxSplitter;
use crate::store::RemoteStore;
use crate::task::{QueryTask, TaskGroup};
use crate::types::Record;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value, feature::Id};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Decomposition log entry, returned to the caller when logging is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogEntry {
    /// One box of the decomposition as a polygon
    Bounds { geometry: Geometry },
    /// The range query issued for a box
    Message { content: String },
}

impl LogEntry {
    pub fn bounds(bbox: &BoundingBox) -> Self {
        LogEntry::Bounds {
            geometry: Geometry::new(Value::Polygon(vec![bbox.ring()])),
        }
    }
}

pub struct GeoSearch {
    config: SearchConfig,
    root: BoundingBox,
    boxes: Vec<BoundingBox>,
    executor: Box<dyn Executor>,
}

impl GeoSearch {
    /// Uncached search; use [`GeoSearchBuilder`](crate::GeoSearchBuilder) to attach a cache.
    pub fn new(config: SearchConfig) -> Result<Self> {
        crate::GeoSearchBuilder::new().config(config).build()
    }

    pub(crate) fn with_executor(config: SearchConfig, executor: Box<dyn Executor>) -> Result<Self> {
        config.validate().map_err(SearchError::InvalidConfig)?;

        let root = BoundingBox::parse(&config.bbox, config.limit)?.normalized(config.caching());
        let boxes = BoxSplitter::new(config.correction, config.border)?.decompose(root)?;
        log::debug!("{} decomposed into {} boxes", root, boxes.len());

        Ok(Self {
            config,
            root,
            boxes,
            executor,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The requested box after normalization.
    pub fn root(&self) -> &BoundingBox {
        &self.root
    }

    /// Boxes queried, in submission order.
    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    /// Run `base_query` over every box.
    ///
    /// `base_query` is a `SELECT` in the store's query language without any
    /// geohash condition. Failures of individual range queries are kept in the
    /// results; only an invalid query or box fails the search as a whole.
    pub fn search(&self, store: &dyn RemoteStore, base_query: &str) -> Result<SearchResults> {
        let predicate = Arc::new(Predicate::parse(base_query)?);
        let mut log = Vec::new();
        let mut group = TaskGroup::new();

        for bbox in &self.boxes {
            let interval = bbox.interval(self.config.geohash_precision)?;
            if self.config.logging {
                log.push(LogEntry::bounds(bbox));
                log.push(LogEntry::Message {
                    content: format!(
                        "SELECT * FROM {} WHERE {GEOHASH_PROPERTY} > {} AND {GEOHASH_PROPERTY} < {} LIMIT {}",
                        predicate.kind(),
                        interval.start,
                        interval.end,
                        bbox.limit
                    ),
                });
            }

            let mut task = QueryTask::new(predicate.bind(interval), bbox.limit);
            if let Some(deadline) = self.config.deadline() {
                task = task.with_deadline(deadline);
            }
            group.push(task);
        }

        let stats = self.executor.run(store, &mut group);
        Ok(SearchResults { group, log, stats })
    }
}

impl fmt::Debug for GeoSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoSearch")
            .field("config", &self.config)
            .field("root", &self.root)
            .field("boxes", &self.boxes)
            .finish()
    }
}

impl Default for GeoSearch {
    /// The whole globe, uncached.
    fn default() -> Self {
        let config = SearchConfig::default();
        let root = BoundingBox::global(config.limit).normalized(false);
        Self {
            boxes: vec![root],
            root,
            config,
            executor: Box::new(TaskRunner::new()),
        }
    }
}

/// Outcome of one search: a result chain per box, in submission order.
#[derive(Debug)]
pub struct SearchResults {
    group: TaskGroup,
    log: Vec<LogEntry>,
    stats: RunStats,
}

impl SearchResults {
    /// Number of chains, one per box.
    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    /// Result of chain `index`: its records or its first error.
    pub fn chain(&self, index: usize) -> Option<std::result::Result<&[Record], &SearchError>> {
        self.group
            .get(index)
            .and_then(|task| task.as_query())
            .map(QueryTask::result)
    }

    /// Records of every successful chain, chains in order and pages in fetch order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.group
            .iter()
            .filter_map(|task| task.as_query())
            .filter_map(|task| task.result().ok())
            .flatten()
    }

    /// First error of every failed chain.
    pub fn errors(&self) -> impl Iterator<Item = &SearchError> {
        self.group
            .iter()
            .filter_map(|task| task.as_query())
            .filter_map(|task| task.result().err())
    }

    /// All records, or the first error if any chain failed.
    pub fn into_records(self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for task in self.group {
            if let crate::task::Task::Query(task) = task {
                records.extend(task.into_result()?);
            }
        }
        Ok(records)
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn tasks(&self) -> &TaskGroup {
        &self.group
    }

    /// Entities of the successful chains as point features.
    ///
    /// Each feature carries the entity key as id and the entity properties
    /// plus its geohash. A non-empty decomposition log travels along as the
    /// `log` foreign member. Keys-only records have no location and are left out.
    pub fn to_feature_collection(&self) -> Result<FeatureCollection> {
        let features = self
            .records()
            .filter_map(Record::as_entity)
            .map(|entity| {
                let mut properties = entity.properties.clone();
                properties.insert(
                    GEOHASH_PROPERTY.to_string(),
                    serde_json::Value::String(entity.geohash.clone()),
                );
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Point(vec![
                        entity.point.x(),
                        entity.point.y(),
                    ]))),
                    id: Some(Id::String(entity.key.to_string())),
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        let foreign_members = if self.log.is_empty() {
            None
        } else {
            let mut members = JsonObject::new();
            members.insert("log".to_string(), serde_json::to_value(&self.log)?);
            Some(members)
        };

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{Entity, EntityKey};
    use geo::Point;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        for (name, lng, lat) in [("paris", 2.35, 48.85), ("berlin", 13.4, 52.52)] {
            store.insert(
                Entity::new(EntityKey::new("ffMarker", name), Point::new(lng, lat), 12)
                    .unwrap()
                    .with_property("name", name),
            );
        }
        store
    }

    #[test]
    fn test_search_logs_every_box() {
        let search = GeoSearch::new(
            SearchConfig::new("-10,40,20,60")
                .with_limit(10)
                .with_logging(true),
        )
        .unwrap();
        let results = search.search(&store(), "SELECT * FROM ffMarker").unwrap();

        assert_eq!(results.len(), search.boxes().len());
        assert_eq!(results.log().len(), 2 * search.boxes().len());
        match &results.log()[1] {
            LogEntry::Message { content } => {
                assert!(content.starts_with("SELECT * FROM ffMarker WHERE geohash > "));
                assert!(content.ends_with(" LIMIT 10"));
            }
            other => panic!("expected a message, got {other:?}"),
        }
        assert_eq!(results.records().count(), 2);
    }

    #[test]
    fn test_logging_disabled_by_default() {
        let search = GeoSearch::new(SearchConfig::new("-10,40,20,60")).unwrap();
        let results = search.search(&store(), "SELECT * FROM ffMarker").unwrap();
        assert!(results.log().is_empty());
    }

    #[test]
    fn test_invalid_query_fails_the_search() {
        let search = GeoSearch::default();
        assert!(matches!(
            search.search(&store(), "SELECT * FROM ffMarker WHERE geohash > 'a'"),
            Err(SearchError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_feature_collection() {
        let search = GeoSearch::new(SearchConfig::new("-10,40,20,60").with_logging(true)).unwrap();
        let results = search.search(&store(), "SELECT * FROM ffMarker").unwrap();

        let collection = results.to_feature_collection().unwrap();
        assert_eq!(collection.features.len(), 2);

        let paris = collection
            .features
            .iter()
            .find(|f| f.id == Some(Id::String("ffMarker:paris".to_string())))
            .unwrap();
        let properties = paris.properties.as_ref().unwrap();
        assert_eq!(properties["name"], "paris");
        assert_eq!(properties["geohash"].as_str().unwrap().len(), 12);

        let json = serde_json::to_value(&collection).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["log"][0]["type"], "bounds");
        assert_eq!(json["log"][0]["geometry"]["type"], "Polygon");
        assert_eq!(json["log"][1]["type"], "message");
    }

    #[test]
    fn test_keys_only_search() {
        let search = GeoSearch::new(SearchConfig::new("-10,40,20,60")).unwrap();
        let results = search.search(&store(), "SELECT __key__ FROM ffMarker").unwrap();

        assert!(results.records().all(|r| matches!(r, Record::Key(_))));
        assert!(results.to_feature_collection().unwrap().features.is_empty());
        assert_eq!(results.into_records().unwrap().len(), 2);
    }
}
