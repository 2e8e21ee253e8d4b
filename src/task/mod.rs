//! Units of remote work and the groups they run in.
//!
//! A [`Task`] knows how to start its first call, how to absorb a completed
//! call (possibly asking for a continuation call), and how it maps onto the
//! result cache. Runners in [`crate::runner`] drive the calls; tasks never
//! touch the store themselves except through [`QueryTask::run`].

use crate::error::Result;
use crate::store::{CallRequest, CallResponse, StoreError};
use bytes::Bytes;
use std::ops::Index;
use std::time::Duration;

mod fetch;
mod query;

pub use fetch::FetchTask;
pub use query::QueryTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not started yet
    Pending,
    /// A call for this task is outstanding
    InFlight,
    /// Finished successfully from the store
    Done,
    /// Finished with at least one error
    Failed,
    /// Served from the cache without a call
    Cached,
}

impl TaskState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cached)
    }
}

#[derive(Debug)]
pub enum Task {
    Query(QueryTask),
    Fetch(FetchTask),
}

impl Task {
    /// Key identifying this task's result in the cache, if it may be cached.
    pub fn cache_key(&self) -> Option<&str> {
        match self {
            Task::Query(task) => task.cache_key(),
            Task::Fetch(task) => Some(task.cache_key()),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        match self {
            Task::Query(task) => task.deadline(),
            Task::Fetch(task) => task.deadline(),
        }
    }

    pub fn state(&self) -> TaskState {
        match self {
            Task::Query(task) => task.state(),
            Task::Fetch(task) => task.state(),
        }
    }

    pub fn as_query(&self) -> Option<&QueryTask> {
        match self {
            Task::Query(task) => Some(task),
            Task::Fetch(_) => None,
        }
    }

    pub fn as_fetch(&self) -> Option<&FetchTask> {
        match self {
            Task::Fetch(task) => Some(task),
            Task::Query(_) => None,
        }
    }

    /// First request to issue, or `None` if the task finished without one.
    pub(crate) fn start(&mut self) -> Option<CallRequest> {
        match self {
            Task::Query(task) => task.start(),
            Task::Fetch(task) => task.start(),
        }
    }

    /// Absorb a completed call; returns the continuation request, if any.
    pub(crate) fn complete(
        &mut self,
        outcome: std::result::Result<CallResponse, StoreError>,
    ) -> Option<CallRequest> {
        match self {
            Task::Query(task) => task.complete(outcome),
            Task::Fetch(task) => {
                task.complete(outcome);
                None
            }
        }
    }

    /// Populate the result from a cache hit.
    pub(crate) fn restore_cached(&mut self, payload: Bytes) -> Result<()> {
        match self {
            Task::Query(task) => task.restore_cached(&payload),
            Task::Fetch(task) => {
                task.restore_cached(payload);
                Ok(())
            }
        }
    }

    /// Serialized result for the cache. `None` unless freshly fetched without error.
    pub(crate) fn cache_payload(&self) -> Option<Result<Bytes>> {
        match self {
            Task::Query(task) => task.cache_payload(),
            Task::Fetch(task) => task.cache_payload().map(Ok),
        }
    }
}

impl From<QueryTask> for Task {
    fn from(task: QueryTask) -> Self {
        Task::Query(task)
    }
}

impl From<FetchTask> for Task {
    fn from(task: FetchTask) -> Self {
        Task::Fetch(task)
    }
}

/// Ordered collection of tasks run together. Results keep submission order.
#[derive(Debug, Default)]
pub struct TaskGroup {
    tasks: Vec<Task>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: impl Into<Task>) {
        self.tasks.push(task.into());
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Task> {
        self.tasks.iter_mut()
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}

impl Index<usize> for TaskGroup {
    type Output = Task;

    fn index(&self, index: usize) -> &Task {
        &self.tasks[index]
    }
}

impl FromIterator<Task> for TaskGroup {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        Self {
            tasks: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TaskGroup {
    type Item = Task;
    type IntoIter = std::vec::IntoIter<Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}

impl<'a> IntoIterator for &'a TaskGroup {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}
