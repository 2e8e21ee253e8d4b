//! In-memory range store ordered by geohash.
//!
//! Honors the remote call lifecycle of [`RemoteStore`]: dispatch only records
//! the request, the work happens on `wait`. Results come back in pages of at
//! most `page_size` records with single-use cursors, which makes it suitable
//! both as an embedded store and as a stand-in for a real remote one in tests.

use super::{
    CallHandle, CallRequest, CallResponse, Cursor, QueryPage, RemoteStore, StoreError, StoreStats,
};
use crate::bbox::MAX_GEOHASH_PRECISION;
use crate::error::Result;
use crate::predicate::BoundQuery;
use crate::types::{Entity, EntityKey, Record};
use bytes::Bytes;
use geo::Point;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::ops::Bound;
use std::time::Duration;

/// Default number of records returned per call.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Default number of open cursors kept before the least recent is dropped.
pub const DEFAULT_MAX_CURSORS: usize = 1024;

type Position = (String, EntityKey);
type FaultInjector = Box<dyn Fn(&CallRequest) -> Option<StoreError> + Send + Sync>;

enum CallState {
    Created(Option<Duration>),
    Dispatched {
        request: CallRequest,
        deadline: Option<Duration>,
    },
    Done(std::result::Result<CallResponse, StoreError>),
}

struct CursorState {
    query: BoundQuery,
    after: Position,
}

pub struct MemoryStore {
    entities: RwLock<BTreeMap<Position, Entity>>,
    resources: RwLock<FxHashMap<String, Bytes>>,
    indexes: RwLock<FxHashSet<(String, Vec<String>)>>,
    require_indexes: bool,
    precision: usize,
    page_size: usize,
    over_return: usize,
    calls: Mutex<FxHashMap<u64, CallState>>,
    cursors: Mutex<LruCache<String, CursorState>>,
    next_call: Mutex<u64>,
    stats: Mutex<StoreStats>,
    fault: Option<FaultInjector>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            resources: RwLock::new(FxHashMap::default()),
            indexes: RwLock::new(FxHashSet::default()),
            require_indexes: false,
            precision: MAX_GEOHASH_PRECISION,
            page_size: DEFAULT_PAGE_SIZE,
            over_return: 0,
            calls: Mutex::new(FxHashMap::default()),
            cursors: Mutex::new(LruCache::new(cursor_capacity(DEFAULT_MAX_CURSORS))),
            next_call: Mutex::new(0),
            stats: Mutex::new(StoreStats::default()),
            fault: None,
        }
    }

    /// Maximum records per page, at least one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Keep at most `max_cursors` open cursors. A chain that stops early never
    /// consumes its cursor, so the least recently issued ones are dropped.
    pub fn with_max_cursors(self, max_cursors: usize) -> Self {
        self.cursors.lock().resize(cursor_capacity(max_cursors));
        self
    }

    /// Return `extra` records more than requested on every page.
    pub fn with_over_return(mut self, extra: usize) -> Self {
        self.over_return = extra;
        self
    }

    /// Reject filtered queries unless a matching composite index was declared.
    pub fn with_required_indexes(mut self) -> Self {
        self.require_indexes = true;
        self
    }

    /// Fail calls for which `fault` returns an error.
    pub fn with_fault<F>(mut self, fault: F) -> Self
    where
        F: Fn(&CallRequest) -> Option<StoreError> + Send + Sync + 'static,
    {
        self.fault = Some(Box::new(fault));
        self
    }

    /// Index an entity under its own geohash.
    pub fn insert(&self, entity: Entity) {
        let position = (entity.geohash.clone(), entity.key.clone());
        self.entities.write().insert(position, entity);
    }

    /// Create and index an entity at `point`.
    pub fn insert_point(&self, key: EntityKey, point: Point) -> Result<()> {
        self.insert(Entity::new(key, point, self.precision)?);
        Ok(())
    }

    pub fn insert_resource(&self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.resources.write().insert(url.into(), body.into());
    }

    /// Declare a composite index over equality `properties` plus geohash.
    pub fn declare_index(&self, kind: &str, properties: &[&str]) {
        self.indexes.write().insert((
            kind.to_string(),
            properties.iter().map(|p| p.to_string()).collect(),
        ));
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.lock().clone()
    }

    /// Cursors issued but not yet consumed.
    pub fn open_cursors(&self) -> usize {
        self.cursors.lock().len()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = StoreStats::default();
    }

    fn execute(
        &self,
        request: &CallRequest,
        deadline: Option<Duration>,
    ) -> std::result::Result<CallResponse, StoreError> {
        if deadline == Some(Duration::ZERO) {
            return Err(StoreError::Timeout);
        }
        if let Some(err) = self.fault.as_ref().and_then(|fault| fault(request)) {
            return Err(err);
        }

        match request {
            CallRequest::RunQuery {
                query,
                limit,
                offset,
            } => {
                self.check_index(query)?;
                let start = (query.interval.start.clone(), EntityKey::new("", ""));
                let count = (*limit).min(self.page_size);
                Ok(CallResponse::Page(self.scan(
                    query,
                    Bound::Included(start),
                    *offset,
                    count,
                )))
            }
            CallRequest::Next { cursor, count } => {
                let state = self
                    .cursors
                    .lock()
                    .pop(&cursor.0)
                    .ok_or(StoreError::UnknownCursor)?;
                let count = (*count).min(self.page_size);
                Ok(CallResponse::Page(self.scan(
                    &state.query,
                    Bound::Excluded(state.after),
                    0,
                    count,
                )))
            }
            CallRequest::Fetch { url } => self
                .resources
                .read()
                .get(url)
                .cloned()
                .map(CallResponse::Body)
                .ok_or_else(|| StoreError::Backend(format!("no resource at {url}"))),
        }
    }

    fn check_index(&self, query: &BoundQuery) -> std::result::Result<(), StoreError> {
        let predicate = &query.predicate;
        if !self.require_indexes || predicate.filters().is_empty() {
            return Ok(());
        }
        let wanted = (
            predicate.kind().to_string(),
            predicate
                .filters()
                .iter()
                .map(|f| f.property.clone())
                .collect::<Vec<_>>(),
        );
        if self.indexes.read().contains(&wanted) {
            Ok(())
        } else {
            Err(StoreError::NeedIndex(format!(
                "no matching index found for kind {}",
                predicate.kind()
            )))
        }
    }

    fn scan(&self, query: &BoundQuery, from: Bound<Position>, offset: usize, count: usize) -> QueryPage {
        let entities = self.entities.read();
        let mut matches = entities
            .range((from, Bound::Unbounded))
            .take_while(|((geohash, _), _)| geohash.as_str() < query.interval.end.as_str())
            .filter(|(_, entity)| query.matches(entity))
            .skip(offset);

        let take = count + self.over_return;
        let mut records = Vec::with_capacity(take);
        let mut last = None;
        for (position, entity) in matches.by_ref().take(take) {
            records.push(if query.predicate.keys_only() {
                Record::Key(entity.key.clone())
            } else {
                Record::Entity(entity.clone())
            });
            last = Some(position.clone());
        }

        let more_results = matches.next().is_some();
        let cursor = match (more_results, last) {
            (true, Some(after)) => {
                let token = uuid::Uuid::new_v4().to_string();
                self.cursors.lock().put(
                    token.clone(),
                    CursorState {
                        query: query.clone(),
                        after,
                    },
                );
                Some(Cursor(token))
            }
            _ => None,
        };

        QueryPage {
            records,
            more_results: cursor.is_some(),
            cursor,
        }
    }
}

fn cursor_capacity(max_cursors: usize) -> NonZeroUsize {
    NonZeroUsize::new(max_cursors).unwrap_or(NonZeroUsize::MIN)
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryStore {
    fn create_call(&self, deadline: Option<Duration>) -> CallHandle {
        let mut next = self.next_call.lock();
        *next += 1;
        self.calls.lock().insert(*next, CallState::Created(deadline));
        CallHandle(*next)
    }

    fn dispatch(&self, call: &CallHandle, request: CallRequest) {
        {
            let mut stats = self.stats.lock();
            match request {
                CallRequest::RunQuery { .. } => stats.run_queries += 1,
                CallRequest::Next { .. } => stats.next_calls += 1,
                CallRequest::Fetch { .. } => stats.fetches += 1,
            }
        }

        let mut calls = self.calls.lock();
        let state = match calls.remove(&call.0) {
            Some(CallState::Created(deadline)) => CallState::Dispatched { request, deadline },
            Some(_) => CallState::Done(Err(StoreError::Backend(
                "call was already dispatched".to_string(),
            ))),
            None => CallState::Done(Err(StoreError::UnknownCall)),
        };
        calls.insert(call.0, state);
    }

    fn wait(&self, call: &CallHandle) {
        let pending = {
            let mut calls = self.calls.lock();
            match calls.remove(&call.0) {
                Some(CallState::Dispatched { request, deadline }) => Some((request, deadline)),
                Some(other) => {
                    calls.insert(call.0, other);
                    None
                }
                None => None,
            }
        };

        if let Some((request, deadline)) = pending {
            let outcome = self.execute(&request, deadline);
            if outcome.is_err() {
                self.stats.lock().failures += 1;
            }
            self.calls.lock().insert(call.0, CallState::Done(outcome));
        }
    }

    fn check_success(&self, call: &CallHandle) -> std::result::Result<CallResponse, StoreError> {
        match self.calls.lock().remove(&call.0) {
            Some(CallState::Done(outcome)) => outcome,
            Some(CallState::Created(_)) => {
                Err(StoreError::Backend("call was never dispatched".to_string()))
            }
            Some(CallState::Dispatched { .. }) => {
                Err(StoreError::Backend("call was not waited on".to_string()))
            }
            None => Err(StoreError::UnknownCall),
        }
    }
}
