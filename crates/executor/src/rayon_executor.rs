//! Rayon-backed executor.
//!
//! Unbounded calls run on rayon's global pool. Bounded calls build a dedicated
//! pool sized to `min(items, max_workers)`, so a fork with three branches gets
//! three workers no matter how large the global pool is.

use log::{debug, warn};
use rayon::prelude::*;
use weft_traits::{Executor, ExecutorError};

#[derive(Debug, Clone)]
pub struct RayonExecutor {
    num_threads: usize,
}

impl RayonExecutor {
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
        }
    }

    fn build_pool(threads: usize) -> Result<rayon::ThreadPool, ExecutorError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("weft-fork-{i}"))
            .build()
            .map_err(|e| ExecutorError::PoolCreation {
                threads,
                message: e.to_string(),
            })
    }
}

impl Default for RayonExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for RayonExecutor {
    fn execute_all<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + Clone + 'static,
    {
        // Indexed parallel iterators collect in input order.
        items.into_par_iter().map(f).collect()
    }

    fn execute_bounded<T, R, F>(&self, items: Vec<T>, max_workers: usize, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + Clone + 'static,
    {
        if items.len() <= 1 {
            return items.into_iter().map(f).collect();
        }
        let threads = items.len().min(max_workers.max(1));
        match Self::build_pool(threads) {
            Ok(pool) => {
                debug!("running {} tasks on a {}-thread pool", items.len(), threads);
                pool.install(|| items.into_par_iter().map(f).collect())
            }
            Err(e) => {
                warn!("{e}; falling back to the global pool");
                self.execute_all(items, f)
            }
        }
    }

    fn parallelism(&self) -> usize {
        self.num_threads
    }

    fn name(&self) -> &'static str {
        "RayonExecutor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn results_follow_input_order_not_completion_order() {
        let executor = RayonExecutor::new();
        // Earlier items sleep longer, so they finish last.
        let results = executor.execute_bounded(vec![4u64, 3, 2, 1], 4, |n| {
            std::thread::sleep(Duration::from_millis(n * 15));
            n
        });
        assert_eq!(results, vec![4, 3, 2, 1]);
    }

    #[test]
    fn failed_tasks_keep_their_position() {
        let executor = RayonExecutor::new();
        let results: Vec<Result<i32, &str>> = executor.execute_bounded(vec![1, 0, 4], 3, |x| {
            if x == 0 { Err("zero") } else { Ok(8 / x) }
        });
        assert_eq!(results, vec![Ok(8), Err("zero"), Ok(2)]);
    }

    #[test]
    fn bounded_pool_runs_every_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let executor = RayonExecutor::new();
        let _ = executor.execute_bounded((0..32).collect::<Vec<_>>(), 3, {
            let counter = counter.clone();
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn parallelism_is_positive() {
        assert!(RayonExecutor::new().parallelism() > 0);
    }
}
