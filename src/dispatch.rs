//! Bounded fan-out of one task per file.
//!
//! Tasks run on a dedicated rayon pool sized by [`WorkerLimit`]. A failing or
//! panicking task only produces an error for its own file; siblings keep
//! running. Results come back in input order regardless of completion order.

use std::{
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use rayon::prelude::*;

use crate::report::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLimit(usize);

impl WorkerLimit {
    pub const DEFAULT_MAX: usize = 12;

    /// Hardware parallelism capped at `max` (and never below one worker).
    pub fn resolve(max: usize) -> Self {
        let available = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self(available.min(max).max(1))
    }

    pub fn exact(workers: usize) -> Self {
        Self(workers.max(1))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for WorkerLimit {
    fn default() -> Self {
        Self::resolve(Self::DEFAULT_MAX)
    }
}

/// Runs `task` once per file with at most `limit` tasks in flight.
///
/// Only failure to build the pool is an error; per-file failures are in the
/// returned vector.
pub fn dispatch<T, F>(
    stage: Stage,
    files: &[PathBuf],
    limit: WorkerLimit,
    task: F,
) -> Result<Vec<(PathBuf, Result<T>)>>
where
    T: Send,
    F: Fn(&Path) -> Result<T> + Sync,
{
    let total = files.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(limit.get())
        .thread_name(move |idx| format!("{stage}-worker-{idx}"))
        .build()
        .with_context(|| format!("Building {stage} worker pool"))?;
    info!(
        "Running {stage} over {total} file(s) with {} worker(s)",
        limit.get()
    );

    let completed = AtomicUsize::new(0);
    let results = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                let result = panic::catch_unwind(AssertUnwindSafe(|| task(path)))
                    .unwrap_or_else(|payload| {
                        Err(anyhow!("task panicked: {}", panic_message(&*payload)))
                    });
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("[{done}/{total}] {stage} {path:?}");
                (path.clone(), result)
            })
            .collect::<Vec<_>>()
    });
    Ok(results)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
