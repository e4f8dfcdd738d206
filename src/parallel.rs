//! Bounded-concurrency runner for independent async tasks.
//!
//! Executes a dynamically-sized batch of zero-argument async closures
//! under a concurrency ceiling. Individual failures are captured in
//! place and never cancel or skip sibling tasks; the result vector is
//! positional: index `i` always holds task `i`'s outcome, regardless of
//! completion order.

use crate::error::CloudBaseResult;
use futures::future::{join_all, BoxFuture};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

const DEFAULT_MAX_PARALLEL: usize = 20;

/// A unit of work: starts when called, settles exactly once.
pub type AsyncTask<T> = Box<dyn FnOnce() -> BoxFuture<'static, CloudBaseResult<T>> + Send>;

/// Box an async closure as an [`AsyncTask`].
pub fn task<T, F, Fut>(f: F) -> AsyncTask<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = CloudBaseResult<T>> + Send + 'static,
{
    Box::new(move || -> BoxFuture<'static, CloudBaseResult<T>> { Box::pin(f()) })
}

/// Runs loaded tasks with at most `max_parallel` in flight at once.
///
/// Tasks are gated by a semaphore; permits are handed out in submission
/// order but nothing is guaranteed about completion order.
pub struct ParallelRunner<T> {
    max_parallel: usize,
    tasks: Vec<AsyncTask<T>>,
}

impl<T: Send + 'static> ParallelRunner<T> {
    /// Create a runner; `max_parallel == 0` falls back to the default of
    /// 20.
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: if max_parallel == 0 {
                DEFAULT_MAX_PARALLEL
            } else {
                max_parallel
            },
            tasks: Vec::new(),
        }
    }

    /// Append a batch of tasks.
    pub fn load_tasks(&mut self, tasks: Vec<AsyncTask<T>>) {
        self.tasks.extend(tasks);
    }

    /// Append a single task.
    pub fn push(&mut self, task: AsyncTask<T>) {
        self.tasks.push(task);
    }

    pub fn total_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Run every task and return the outcomes in submission order.
    ///
    /// Always resolves once every task has settled; a failed task
    /// contributes its error at its own index and nothing else.
    pub async fn run(self) -> Vec<CloudBaseResult<T>> {
        let permits = Arc::new(Semaphore::new(self.max_parallel));
        let gated = self.tasks.into_iter().map(|task| {
            let permits = Arc::clone(&permits);
            async move {
                let _permit = permits.acquire().await.expect("semaphore is never closed");
                task().await
            }
        });
        join_all(gated).await
    }
}
