//! Records returned by range queries.
use geo::Point;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identity of a stored entity: its kind plus a name unique within the kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: String,
    pub name: String,
}

impl EntityKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// A located record with its geohash index key and free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: EntityKey,
    pub point: Point,
    pub geohash: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Entity {
    /// Create an entity, computing its geohash at the given precision.
    pub fn new(key: EntityKey, point: Point, precision: usize) -> crate::Result<Self> {
        let geohash = geohash::encode(point.into(), precision)?;
        Ok(Self {
            key,
            point,
            geohash,
            properties: Map::new(),
        })
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// One row of a query result: a full entity, or only its key for
/// `SELECT __key__` predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Entity(Entity),
    Key(EntityKey),
}

impl Record {
    pub fn key(&self) -> &EntityKey {
        match self {
            Record::Entity(entity) => &entity.key,
            Record::Key(key) => key,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Record::Entity(entity) => Some(entity),
            Record::Key(_) => None,
        }
    }
}
