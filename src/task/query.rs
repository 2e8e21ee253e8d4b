//! Range query task with automatic continuation.

use super::TaskState;
use crate::error::{Result, SearchError};
use crate::predicate::BoundQuery;
use crate::store::{
    CallRequest, CallResponse, RemoteStore, StoreError, finish_call, start_call,
};
use crate::types::Record;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

type Callback = Box<dyn FnMut(&QueryTask)>;

/// One geohash range query and its continuation chain.
///
/// The chain keeps requesting further pages until `limit` records are
/// collected or the store reports there are no more. Store failures are
/// recorded rather than raised; the first one surfaces from [`result`].
///
/// [`result`]: QueryTask::result
pub struct QueryTask {
    query: BoundQuery,
    limit: usize,
    offset: usize,
    deadline: Option<Duration>,
    cache_key: String,
    cacheable: bool,
    records: Vec<Record>,
    errors: Vec<SearchError>,
    cached: Option<Vec<Record>>,
    state: TaskState,
    calls: usize,
    callback: Option<Callback>,
}

impl QueryTask {
    pub fn new(query: BoundQuery, limit: usize) -> Self {
        Self {
            cache_key: cache_key(&query, limit, 0),
            query,
            limit,
            offset: 0,
            deadline: None,
            cacheable: true,
            records: Vec::new(),
            errors: Vec::new(),
            cached: None,
            state: TaskState::Pending,
            calls: 0,
            callback: None,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self.cache_key = cache_key(&self.query, self.limit, offset);
        self
    }

    /// Deadline handed to every call of the chain.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Never read from or write to the cache.
    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }

    /// Run `callback` once, when the chain terminates either way.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&QueryTask) + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn query(&self) -> &BoundQuery {
        &self.query
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Calls issued so far, first query and continuations together.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn errors(&self) -> &[SearchError] {
        &self.errors
    }

    /// `query=<bound query>,limit=<limit>,offset=<offset>`
    pub fn cache_key(&self) -> Option<&str> {
        self.cacheable.then_some(self.cache_key.as_str())
    }

    /// The records collected, or the first error of the chain.
    pub fn result(&self) -> std::result::Result<&[Record], &SearchError> {
        if let Some(cached) = &self.cached {
            return Ok(cached);
        }
        match self.errors.first() {
            Some(err) => Err(err),
            None => Ok(&self.records),
        }
    }

    pub fn into_result(mut self) -> Result<Vec<Record>> {
        if let Some(cached) = self.cached.take() {
            return Ok(cached);
        }
        if self.errors.is_empty() {
            Ok(std::mem::take(&mut self.records))
        } else {
            Err(self.errors.swap_remove(0))
        }
    }

    /// Run the whole chain on its own, waiting on each continuation in turn.
    pub fn run(&mut self, store: &dyn RemoteStore) -> std::result::Result<&[Record], &SearchError> {
        let mut next = self.start();
        while let Some(request) = next {
            let call = start_call(store, request, self.deadline);
            next = self.complete(finish_call(store, call));
        }
        self.result()
    }

    pub(crate) fn start(&mut self) -> Option<CallRequest> {
        if self.state != TaskState::Pending {
            return None;
        }
        if self.limit == 0 {
            self.finish(TaskState::Done);
            return None;
        }
        log::debug!(
            "range query {} limit {} offset {}",
            self.query.interval,
            self.limit,
            self.offset
        );
        self.state = TaskState::InFlight;
        self.calls += 1;
        Some(CallRequest::RunQuery {
            query: self.query.clone(),
            limit: self.limit,
            offset: self.offset,
        })
    }

    pub(crate) fn complete(
        &mut self,
        outcome: std::result::Result<CallResponse, StoreError>,
    ) -> Option<CallRequest> {
        let page = match outcome {
            Ok(CallResponse::Page(page)) => page,
            Ok(CallResponse::Body(_)) => {
                self.fail(SearchError::RemoteCall(StoreError::UnexpectedResponse(
                    "body returned for a range query",
                )));
                return None;
            }
            Err(err) => {
                let err = self.translate(err);
                self.fail(err);
                return None;
            }
        };

        let remaining = self.limit.saturating_sub(self.records.len());
        let received = page.records.len();
        // The store may return more than asked for.
        self.records.extend(page.records.into_iter().take(remaining));

        if page.more_results
            && received < remaining
            && let Some(cursor) = page.cursor
        {
            let count = remaining - received;
            log::debug!(
                "continuing {} for {} more records",
                self.query.interval,
                count
            );
            self.calls += 1;
            return Some(CallRequest::Next { cursor, count });
        }

        self.finish(TaskState::Done);
        None
    }

    pub(crate) fn restore_cached(&mut self, payload: &Bytes) -> Result<()> {
        let records: Vec<Record> = serde_json::from_slice(payload)?;
        self.cached = Some(records);
        self.finish(TaskState::Cached);
        Ok(())
    }

    pub(crate) fn cache_payload(&self) -> Option<Result<Bytes>> {
        if !self.cacheable || self.state != TaskState::Done {
            return None;
        }
        Some(
            serde_json::to_vec(&self.records)
                .map(Bytes::from)
                .map_err(SearchError::from),
        )
    }

    fn translate(&self, err: StoreError) -> SearchError {
        match err {
            StoreError::NeedIndex(message) => SearchError::IndexMissing {
                message,
                index: self.query.predicate.suggested_index(),
            },
            other => SearchError::RemoteCall(other),
        }
    }

    fn fail(&mut self, err: SearchError) {
        log::debug!("range query {} failed: {}", self.query.interval, err);
        self.errors.push(err);
        self.finish(TaskState::Failed);
    }

    fn finish(&mut self, state: TaskState) {
        self.state = state;
        if let Some(mut callback) = self.callback.take() {
            callback(self);
        }
    }
}

fn cache_key(query: &BoundQuery, limit: usize, offset: usize) -> String {
    format!("query={query},limit={limit},offset={offset}")
}

impl fmt::Debug for QueryTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryTask")
            .field("query", &self.query.to_string())
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("state", &self.state)
            .field("records", &self.records.len())
            .field("errors", &self.errors.len())
            .finish()
    }
}
