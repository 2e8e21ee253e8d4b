//! Task group execution.
//!
//! [`TaskRunner`] dispatches the first call of every task before waiting on
//! any of them, then drains a work queue of outstanding calls. A completed
//! call may hand back a continuation request; that request is dispatched
//! right away and queued behind everything already outstanding. The run ends
//! when the queue is empty, so a group is only done once no task asks for
//! more.

use crate::store::{CallHandle, RemoteStore, finish_call, start_call};
use crate::task::{Task, TaskGroup};
use std::collections::VecDeque;

mod cached;

pub use cached::CachedRunner;

/// Anything that can drive a [`TaskGroup`] to completion.
pub trait Executor {
    fn run(&self, store: &dyn RemoteStore, group: &mut TaskGroup) -> RunStats;
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Calls dispatched, continuations included
    pub dispatched: usize,
    /// Continuation calls among `dispatched`
    pub continuations: usize,
    /// Most calls outstanding at the same time
    pub max_in_flight: usize,
    /// Tasks served from the cache
    pub cache_hits: usize,
    /// Tasks that finished with an error
    pub failed: usize,
}

impl RunStats {
    fn merge(&mut self, other: RunStats) {
        self.dispatched += other.dispatched;
        self.continuations += other.continuations;
        self.max_in_flight = self.max_in_flight.max(other.max_in_flight);
        self.cache_hits += other.cache_hits;
        self.failed += other.failed;
    }
}

/// Uncached work-queue executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskRunner;

impl TaskRunner {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn run_tasks(&self, store: &dyn RemoteStore, tasks: &mut [&mut Task]) -> RunStats {
        let mut stats = RunStats::default();
        let mut queue: VecDeque<(usize, CallHandle)> = VecDeque::with_capacity(tasks.len());

        for (index, task) in tasks.iter_mut().enumerate() {
            if let Some(request) = task.start() {
                queue.push_back((index, start_call(store, request, task.deadline())));
                stats.dispatched += 1;
            }
        }
        stats.max_in_flight = queue.len();

        while let Some((index, call)) = queue.pop_front() {
            let task = &mut tasks[index];
            let outcome = finish_call(store, call);
            if let Some(request) = task.complete(outcome) {
                queue.push_back((index, start_call(store, request, task.deadline())));
                stats.dispatched += 1;
                stats.continuations += 1;
                stats.max_in_flight = stats.max_in_flight.max(queue.len());
            }
        }

        stats.failed = tasks
            .iter()
            .filter(|task| task.state() == crate::task::TaskState::Failed)
            .count();
        log::debug!(
            "ran {} tasks: {} calls, {} continuations, {} failed",
            tasks.len(),
            stats.dispatched,
            stats.continuations,
            stats.failed
        );
        stats
    }
}

impl Executor for TaskRunner {
    fn run(&self, store: &dyn RemoteStore, group: &mut TaskGroup) -> RunStats {
        let mut tasks: Vec<&mut Task> = group.iter_mut().collect();
        self.run_tasks(store, &mut tasks)
    }
}
