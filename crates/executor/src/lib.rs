//! Executors for `xsl:fork` branches.
//!
//! - [`RayonExecutor`]: work-stealing pool (feature: `rayon`)
//! - [`SyncExecutor`]: runs branches one after another on the calling thread
//!
//! ```ignore
//! use weft_executor::{ExecutorImpl, RayonExecutor};
//! use weft_traits::Executor;
//!
//! let executor = ExecutorImpl::Rayon(RayonExecutor::new());
//! let doubled = executor.execute_bounded(vec![1, 2, 3], 3, |x| x * 2);
//! ```

#[cfg(feature = "rayon")]
mod rayon_executor;

#[cfg(feature = "rayon")]
pub use rayon_executor::RayonExecutor;

pub use weft_traits::{Executor, ExecutorError, SyncExecutor};

/// Concrete executor chosen at configuration time.
///
/// `Executor` has generic methods, so it cannot be stored as `dyn Executor`; this
/// enum delegates to the wrapped implementation instead.
#[derive(Clone, Debug)]
pub enum ExecutorImpl {
    Sync(SyncExecutor),

    #[cfg(feature = "rayon")]
    Rayon(RayonExecutor),
}

impl Executor for ExecutorImpl {
    fn execute_all<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + Clone + 'static,
    {
        match self {
            ExecutorImpl::Sync(exec) => exec.execute_all(items, f),
            #[cfg(feature = "rayon")]
            ExecutorImpl::Rayon(exec) => exec.execute_all(items, f),
        }
    }

    fn execute_bounded<T, R, F>(&self, items: Vec<T>, max_workers: usize, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + Clone + 'static,
    {
        match self {
            ExecutorImpl::Sync(exec) => exec.execute_bounded(items, max_workers, f),
            #[cfg(feature = "rayon")]
            ExecutorImpl::Rayon(exec) => exec.execute_bounded(items, max_workers, f),
        }
    }

    fn parallelism(&self) -> usize {
        match self {
            ExecutorImpl::Sync(exec) => exec.parallelism(),
            #[cfg(feature = "rayon")]
            ExecutorImpl::Rayon(exec) => exec.parallelism(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ExecutorImpl::Sync(exec) => exec.name(),
            #[cfg(feature = "rayon")]
            ExecutorImpl::Rayon(exec) => exec.name(),
        }
    }
}

impl Default for ExecutorImpl {
    fn default() -> Self {
        #[cfg(feature = "rayon")]
        {
            ExecutorImpl::Rayon(RayonExecutor::new())
        }
        #[cfg(not(feature = "rayon"))]
        {
            ExecutorImpl::Sync(SyncExecutor::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_variant_delegates() {
        let exec = ExecutorImpl::Sync(SyncExecutor::new());
        assert_eq!(exec.name(), "SyncExecutor");
        assert_eq!(exec.execute_bounded(vec![1, 2], 8, |x| x + 1), vec![2, 3]);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn default_is_rayon() {
        assert_eq!(ExecutorImpl::default().name(), "RayonExecutor");
    }
}
