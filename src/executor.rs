//! Data-parallel fan-out used by the brush and fill passes.
//!
//! Everything that decides pixels independently goes through
//! [`Executor::filter_indices`], so tests and single-threaded hosts can swap
//! in `Serial` without touching the algorithms.

use rayon::prelude::*;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Smallest chunk handed to a rayon worker. Below this the split overhead
/// dominates the per-pixel predicate.
pub const DEFAULT_MIN_BATCH: usize = 32;

#[derive(Clone, Default)]
pub enum Executor {
    /// Plain loop on the calling thread.
    Serial,
    /// rayon's global pool.
    #[default]
    Global,
    /// A dedicated pool, e.g. sized from settings.
    Pool(Arc<rayon::ThreadPool>),
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Executor::Serial => write!(f, "Serial"),
            Executor::Global => write!(f, "Global"),
            Executor::Pool(pool) => write!(f, "Pool({} threads)", pool.current_num_threads()),
        }
    }
}

impl Executor {
    /// `0` selects the global pool. If a dedicated pool cannot be built the
    /// global one is used instead.
    pub fn with_threads(threads: usize) -> Self {
        if threads == 0 {
            return Executor::Global;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("spritecore-worker-{i}"))
            .build()
        {
            Ok(pool) => Executor::Pool(Arc::new(pool)),
            Err(e) => {
                tracing::warn!("failed to build {threads}-thread pool, using global pool: {e}");
                Executor::Global
            }
        }
    }

    pub fn threads(&self) -> usize {
        match self {
            Executor::Serial => 1,
            Executor::Global => rayon::current_num_threads(),
            Executor::Pool(pool) => pool.current_num_threads(),
        }
    }

    /// Return every index in `range` for which `keep` holds, in ascending
    /// order regardless of how the work was split.
    pub fn filter_indices<F>(&self, range: Range<usize>, min_batch: usize, keep: F) -> Vec<usize>
    where
        F: Fn(usize) -> bool + Sync + Send,
    {
        let min_batch = min_batch.max(1);
        match self {
            Executor::Serial => range.filter(|&i| keep(i)).collect(),
            Executor::Global => par_filter(range, min_batch, &keep),
            Executor::Pool(pool) => pool.install(|| par_filter(range, min_batch, &keep)),
        }
    }
}

fn par_filter<F>(range: Range<usize>, min_batch: usize, keep: &F) -> Vec<usize>
where
    F: Fn(usize) -> bool + Sync + Send,
{
    range
        .into_par_iter()
        .with_min_len(min_batch)
        .filter(|&i| keep(i))
        .collect()
}
