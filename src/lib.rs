//! Fault-line friendly bounding box search over geohash range stores.
//!
//! A store that can only answer `geohash > start AND geohash < end` queries
//! cannot serve an arbitrary rectangle with one range: geohash order breaks
//! along fault lines and at the antimeridian. The box is decomposed into up
//! to a handful of safe boxes, each queried with its own range and its share
//! of the result limit, with pagination, partial failures and caching handled
//! per range.
//!
//! ```rust
//! use ffgeo::{EntityKey, GeoSearchBuilder, MemoryStore, Point};
//!
//! let store = MemoryStore::new();
//! store.insert_point(EntityKey::new("ffMarker", "nyc"), Point::new(-74.0060, 40.7128))?;
//!
//! let search = GeoSearchBuilder::new()
//!     .bbox("-80,35,-70,45")
//!     .limit(100)
//!     .correction(1)
//!     .build()?;
//! let results = search.search(&store, "SELECT * FROM ffMarker")?;
//! assert_eq!(results.records().count(), 1);
//! # Ok::<(), ffgeo::SearchError>(())
//! ```

pub mod bbox;
pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod predicate;
pub mod runner;
pub mod search;
pub mod split;
pub mod store;
pub mod task;
pub mod types;

pub use bbox::{BoundingBox, GeohashInterval, fault_point};
pub use builder::GeoSearchBuilder;
pub use cache::{CacheService, CacheStats, MemoryCache};
pub use config::SearchConfig;
pub use error::{Result, SearchError};
pub use predicate::{BoundQuery, Filter, Predicate};
pub use runner::{CachedRunner, Executor, RunStats, TaskRunner};
pub use search::{GeoSearch, LogEntry, SearchResults};
pub use split::BoxSplitter;
pub use store::{
    CallHandle, CallRequest, CallResponse, Cursor, MemoryStore, QueryPage, RemoteStore,
    StoreError, StoreStats,
};
pub use task::{FetchTask, QueryTask, Task, TaskGroup, TaskState};
pub use types::{Entity, EntityKey, Record};

pub use geo::{Coord, Point};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoSearch, GeoSearchBuilder, Result, SearchConfig, SearchError};

    pub use geo::Point;

    pub use crate::{BoundingBox, BoxSplitter};

    pub use crate::{CacheService, MemoryCache, MemoryStore, RemoteStore};

    pub use crate::{Entity, EntityKey, Record};
}
