//! Per-point execution strategy.
//!
//! Every per-point pass in this crate is a pure function of the point index
//! and read-only shared state, so the same closure can run either on the
//! calling thread or across the rayon thread pool.

use rayon::prelude::*;

/// How per-point work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Executor {
    /// Run on the rayon global thread pool.
    #[default]
    Parallel,
    /// Run on the calling thread, in index order.
    Sequential,
}

impl Executor {
    /// Pick an executor from a `parallel` flag.
    #[inline]
    pub fn from_parallel(parallel: bool) -> Self {
        if parallel {
            Executor::Parallel
        } else {
            Executor::Sequential
        }
    }

    /// Evaluate `f` for every index in `0..len`, collecting results in index
    /// order regardless of the schedule.
    pub fn map<T, F>(self, len: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            Executor::Parallel => (0..len).into_par_iter().map(f).collect(),
            Executor::Sequential => (0..len).map(f).collect(),
        }
    }

    /// Like [`map`](Self::map) but gives each worker its own scratch value
    /// created by `init`, so hot loops can reuse buffers.
    pub fn map_with_scratch<S, T, I, F>(self, len: usize, init: I, f: F) -> Vec<T>
    where
        T: Send,
        I: Fn() -> S + Sync + Send,
        F: Fn(&mut S, usize) -> T + Sync + Send,
    {
        match self {
            Executor::Parallel => (0..len).into_par_iter().map_init(init, f).collect(),
            Executor::Sequential => {
                let mut scratch = init();
                (0..len).map(|i| f(&mut scratch, i)).collect()
            }
        }
    }
}
