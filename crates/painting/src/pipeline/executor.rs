//! Worker pool for the bucket passes
//!
//! Workers do not receive buckets up front. Each one claims bucket indices
//! from a shared atomic cursor until the range is exhausted, so the pool
//! only needs to run `n` closures to completion and hand back their results.

use std::num::NonZeroUsize;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, warn};

/// Runs the workers of one stroke
#[derive(Debug)]
pub enum WorkerPool {
    /// Everything on the calling thread
    Sequential,
    Rayon(rayon::ThreadPool),
}

impl WorkerPool {
    /// Build a pool with `threads` workers, or one per core when None.
    ///
    /// A single worker, or a pool that fails to start, runs sequentially.
    pub fn new(threads: Option<usize>) -> Self {
        let threads = threads
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, NonZeroUsize::get))
            .max(1);
        if threads == 1 {
            return WorkerPool::Sequential;
        }
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => {
                debug!("Paint worker pool: {} threads", threads);
                WorkerPool::Rayon(pool)
            }
            Err(err) => {
                warn!("Paint worker pool unavailable, painting on one thread: {}", err);
                WorkerPool::Sequential
            }
        }
    }

    pub fn thread_count(&self) -> usize {
        match self {
            WorkerPool::Sequential => 1,
            WorkerPool::Rayon(pool) => pool.current_num_threads(),
        }
    }

    /// Run one closure per worker and wait for all of them.
    ///
    /// Results are returned in worker order.
    pub fn run_workers<R, F>(&self, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Send + Sync,
    {
        match self {
            WorkerPool::Sequential => vec![f(0)],
            WorkerPool::Rayon(pool) => {
                let workers = pool.current_num_threads();
                pool.install(|| (0..workers).into_par_iter().map(&f).collect())
            }
        }
    }
}
