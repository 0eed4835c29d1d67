//! Task execution seam used by `xsl:fork`.
//!
//! The trait has generic methods and therefore cannot be a trait object; the
//! `weft-executor` crate provides `ExecutorImpl`, an enum over the concrete
//! executors, for places that need to store one.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ExecutorError {
    #[error("failed to build worker pool with {threads} threads: {message}")]
    PoolCreation { threads: usize, message: String },
}

pub trait Executor: Send + Sync {
    /// Runs `f` over every item. Results come back in item order.
    fn execute_all<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + Clone + 'static;

    /// Like [`Executor::execute_all`], using at most `max_workers` threads.
    fn execute_bounded<T, R, F>(&self, items: Vec<T>, max_workers: usize, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + Clone + 'static,
    {
        let _ = max_workers;
        self.execute_all(items, f)
    }

    fn parallelism(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Runs every task on the calling thread, in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncExecutor;

impl SyncExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for SyncExecutor {
    fn execute_all<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + Clone + 'static,
    {
        items.into_iter().map(f).collect()
    }

    fn parallelism(&self) -> usize {
        1
    }

    fn name(&self) -> &'static str {
        "SyncExecutor"
    }
}
