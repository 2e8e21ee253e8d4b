//! Remote range-query store abstraction.
//!
//! The search core only relies on a four-step call lifecycle: create a call
//! (optionally with a deadline), dispatch a request on it without blocking,
//! wait for it, then check whether it succeeded. Many calls may be in flight
//! at once; transport and serialization belong to the implementation.

use crate::predicate::BoundQuery;
use crate::types::Record;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

mod memory;

pub use memory::MemoryStore;

/// Opaque identifier of one call created by a [`RemoteStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallHandle(pub(crate) u64);

/// Store-issued position used to continue a truncated result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(pub String);

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallRequest {
    /// Start a range query.
    RunQuery {
        query: BoundQuery,
        limit: usize,
        offset: usize,
    },
    /// Fetch up to `count` further results after `cursor`.
    Next { cursor: Cursor, count: usize },
    /// Fetch an opaque resource.
    Fetch { url: String },
}

impl CallRequest {
    pub fn method(&self) -> &'static str {
        match self {
            CallRequest::RunQuery { .. } => "RunQuery",
            CallRequest::Next { .. } => "Next",
            CallRequest::Fetch { .. } => "Fetch",
        }
    }
}

/// One page of range query results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPage {
    pub records: Vec<Record>,
    /// The store holds further matches beyond this page.
    pub more_results: bool,
    /// Continuation point, present whenever `more_results` is set.
    pub cursor: Option<Cursor>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallResponse {
    Page(QueryPage),
    Body(Bytes),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The predicate needs a composite index the store does not have.
    #[error("{0}")]
    NeedIndex(String),
    #[error("deadline exceeded")]
    Timeout,
    #[error("backend error: {0}")]
    Backend(String),
    #[error("cursor is unknown or already consumed")]
    UnknownCursor,
    #[error("call was never created")]
    UnknownCall,
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),
}

/// The remote call primitive.
///
/// Implementations decide when work actually happens; callers must not assume
/// anything beyond "the response is available after `wait` returns".
pub trait RemoteStore {
    /// Allocate a new call. The deadline is passed through untouched.
    fn create_call(&self, deadline: Option<Duration>) -> CallHandle;

    /// Issue `request` on `call` without waiting for it.
    fn dispatch(&self, call: &CallHandle, request: CallRequest);

    /// Block until `call` has completed.
    fn wait(&self, call: &CallHandle);

    /// Take the outcome of a completed call. Each call yields its outcome once.
    fn check_success(&self, call: &CallHandle) -> Result<CallResponse, StoreError>;
}

/// Create and dispatch a call in one step.
pub(crate) fn start_call(
    store: &dyn RemoteStore,
    request: CallRequest,
    deadline: Option<Duration>,
) -> CallHandle {
    let call = store.create_call(deadline);
    log::debug!("dispatching {} call {:?}", request.method(), call);
    store.dispatch(&call, request);
    call
}

/// Wait for a call and take its outcome.
pub(crate) fn finish_call(
    store: &dyn RemoteStore,
    call: CallHandle,
) -> Result<CallResponse, StoreError> {
    store.wait(&call);
    store.check_success(&call)
}

/// Call counters kept by [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// `RunQuery` requests dispatched
    pub run_queries: u64,
    /// `Next` continuation requests dispatched
    pub next_calls: u64,
    /// `Fetch` requests dispatched
    pub fetches: u64,
    /// Calls that completed with an error
    pub failures: u64,
}

impl StoreStats {
    /// All dispatched calls.
    pub fn dispatched(&self) -> u64 {
        self.run_queries + self.next_calls + self.fetches
    }
}
