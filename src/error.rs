//! Error types for geohash searches.

use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    /// The store needs a composite index to serve the predicate.
    #[error("{message}\nThis query needs this index:\n{index}")]
    IndexMissing { message: String, index: String },

    #[error("Remote call failed: {0}")]
    RemoteCall(StoreError),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Geohash error: {0}")]
    Geohash(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    /// True for failures reported by the remote store, as opposed to misuse.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::IndexMissing { .. } | Self::RemoteCall(_))
    }
}

impl From<geohash::GeohashError> for SearchError {
    fn from(err: geohash::GeohashError) -> Self {
        Self::Geohash(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
