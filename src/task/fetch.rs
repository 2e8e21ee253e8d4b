//! Opaque resource fetch, cached under its url.

use super::TaskState;
use crate::error::{Result, SearchError};
use crate::store::{CallRequest, CallResponse, StoreError};
use bytes::Bytes;
use std::time::Duration;

#[derive(Debug)]
pub struct FetchTask {
    url: String,
    deadline: Option<Duration>,
    body: Option<Bytes>,
    error: Option<SearchError>,
    state: TaskState,
}

impl FetchTask {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(SearchError::MalformedRequest(
                "fetch url must not be empty".to_string(),
            ));
        }
        Ok(Self {
            url,
            deadline: None,
            body: None,
            error: None,
            state: TaskState::Pending,
        })
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches are keyed by url alone.
    pub fn cache_key(&self) -> &str {
        &self.url
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// The fetched body or the error, `None` until the task has finished.
    pub fn result(&self) -> Option<std::result::Result<&Bytes, &SearchError>> {
        match (&self.error, &self.body) {
            (Some(err), _) => Some(Err(err)),
            (None, Some(body)) => Some(Ok(body)),
            (None, None) => None,
        }
    }

    pub(crate) fn start(&mut self) -> Option<CallRequest> {
        if self.state != TaskState::Pending {
            return None;
        }
        log::debug!("fetching {}", self.url);
        self.state = TaskState::InFlight;
        Some(CallRequest::Fetch {
            url: self.url.clone(),
        })
    }

    pub(crate) fn complete(&mut self, outcome: std::result::Result<CallResponse, StoreError>) {
        match outcome {
            Ok(CallResponse::Body(body)) => {
                self.body = Some(body);
                self.state = TaskState::Done;
            }
            Ok(CallResponse::Page(_)) => {
                self.fail(StoreError::UnexpectedResponse("page returned for a fetch"));
            }
            Err(err) => self.fail(err),
        }
    }

    pub(crate) fn restore_cached(&mut self, payload: Bytes) {
        self.body = Some(payload);
        self.state = TaskState::Cached;
    }

    pub(crate) fn cache_payload(&self) -> Option<Bytes> {
        match self.state {
            TaskState::Done => self.body.clone(),
            _ => None,
        }
    }

    fn fail(&mut self, err: StoreError) {
        log::debug!("fetch {} failed: {}", self.url, err);
        self.error = Some(SearchError::RemoteCall(err));
        self.state = TaskState::Failed;
    }
}
