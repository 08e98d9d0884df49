//! Bounded worker pool for external lookups.
//!
//! Embed fetches and size probes are independent network calls. They run on
//! a dedicated `rayon` pool so one slow document cannot starve the global
//! pool, and results always come back in input order.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 4;

/// Runs per-item work in parallel, or inline when sized 0 or 1.
#[derive(Debug)]
pub struct WorkerPool {
    pool: Option<ThreadPool>,
}

impl WorkerPool {
    /// Create a pool with `workers` threads.
    ///
    /// `0` and `1` run everything on the calling thread. If the OS refuses to
    /// spawn threads, the pool falls back to sequential execution.
    pub fn new(workers: usize) -> Self {
        if workers <= 1 {
            return Self::sequential();
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("enrich-worker-{index}"))
            .build();
        match pool {
            Ok(pool) => Self { pool: Some(pool) },
            Err(e) => {
                tracing::warn!(workers, error = %e, "Failed to start worker pool, running sequentially");
                Self::sequential()
            }
        }
    }

    /// Pool that runs everything on the calling thread.
    pub fn sequential() -> Self {
        Self { pool: None }
    }

    /// Number of threads work is spread across.
    pub fn workers(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(1, ThreadPool::current_num_threads)
    }

    /// Apply `f` to every item, returning results in item order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Send + Sync,
    {
        match &self.pool {
            Some(pool) if items.len() > 1 => pool.install(|| items.par_iter().map(&f).collect()),
            _ => items.iter().map(f).collect(),
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}
