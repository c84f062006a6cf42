// Static partitioning of work items across a one-shot worker pool.
//
// Items are split into contiguous slices, one per worker, and every slice
// becomes one task on a pool sized to the slice count and built for this
// call alone. Each worker owns its result table; a worker that returns an
// error or panics keeps the rows it had already produced and the failure is
// reported alongside them.

use std::any::Any;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use indicatif::ProgressBar;
use log::{debug, info, warn};

use crate::error::{AnalysisError, Result};
use crate::table::ResultTable;

pub trait Worker<T>: Sync {
    // Process a contiguous slice of items in order, appending rows to
    // `table`. Per-item state should live on the stack of this call.
    fn process(&self, items: &[T], table: &mut ResultTable, progress: &ProgressBar) -> Result<()>;
}

#[derive(Clone)]
pub struct RunOptions {
    // Upper bound on worker count. Defaults to the number of logical
    // processors.
    pub parallelism: Option<usize>,
    pub progress: ProgressBar,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            parallelism: None,
            progress: ProgressBar::hidden(),
        }
    }
}

impl RunOptions {
    pub fn with_parallelism(parallelism: usize) -> Self {
        RunOptions {
            parallelism: Some(parallelism),
            ..Default::default()
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }
}

#[derive(Debug)]
pub struct WorkerOutcome {
    pub worker: usize,
    pub items: Range<usize>,
    pub table: ResultTable,
    pub error: Option<AnalysisError>,
}

impl WorkerOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub workers: Vec<WorkerOutcome>,
}

impl RunReport {
    pub fn tables(&self) -> impl Iterator<Item = &ResultTable> {
        self.workers.iter().map(|w| &w.table)
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkerOutcome> {
        self.workers.iter().filter(|w| !w.is_ok())
    }

    pub fn is_partial(&self) -> bool {
        self.workers.iter().any(|w| !w.is_ok())
    }

    pub fn row_count(&self) -> usize {
        self.workers.iter().map(|w| w.table.len()).sum()
    }

    // Concatenate the per-worker tables in worker order.
    pub fn concatenated(&self) -> ResultTable {
        let mut table = ResultTable::new();
        for outcome in &self.workers {
            table.append(outcome.table.clone());
        }
        table
    }

    // Same as `concatenated`, moving the rows out instead of copying them.
    pub fn into_concatenated(self) -> ResultTable {
        let mut table = ResultTable::new();
        for outcome in self.workers {
            table.append(outcome.table);
        }
        table
    }

    pub fn log_failures(&self, what: &str) {
        for failure in self.failures() {
            if let Some(err) = &failure.error {
                warn!(
                    "{}: worker {} failed on items {:?} after {} rows: {}",
                    what,
                    failure.worker,
                    failure.items,
                    failure.table.len(),
                    err
                );
            }
        }
    }
}

// Split `m` items into contiguous slices of ceil(m / w) items, where
// w = min(parallelism, m). Empty trailing slices are dropped, so no worker
// is ever started with nothing to do.
pub fn slice_ranges(m: usize, parallelism: usize) -> Vec<Range<usize>> {
    let w = parallelism.max(1).min(m);
    if w == 0 {
        return Vec::new();
    }
    let k = m.div_ceil(w);
    (0..w)
        .map(|i| (i * k).min(m)..((i + 1) * k).min(m))
        .filter(|r| !r.is_empty())
        .collect()
}

pub fn run_partitioned<T, W>(items: &[T], worker: &W, opts: &RunOptions) -> Result<RunReport>
where
    T: Sync,
    W: Worker<T>,
{
    let ranges = slice_ranges(items.len(), opts.parallelism());
    if ranges.is_empty() {
        return Ok(RunReport::default());
    }

    let t0 = Instant::now();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ranges.len())
        .thread_name(|i| format!("tilestats-worker-{}", i))
        .build()?;

    let mut slots: Vec<Option<WorkerOutcome>> = ranges.iter().map(|_| None).collect();
    pool.scope(|s| {
        for (index, (range, slot)) in ranges.iter().zip(slots.iter_mut()).enumerate() {
            let progress = &opts.progress;
            s.spawn(move |_| {
                *slot = Some(run_worker(index, range.clone(), items, worker, progress));
            });
        }
    });

    let workers: Vec<WorkerOutcome> = slots.into_iter().flatten().collect();
    info!(
        "Processed {} items with {} workers in {:?}",
        items.len(),
        workers.len(),
        t0.elapsed()
    );

    Ok(RunReport { workers })
}

fn run_worker<T, W>(
    index: usize,
    range: Range<usize>,
    items: &[T],
    worker: &W,
    progress: &ProgressBar,
) -> WorkerOutcome
where
    W: Worker<T>,
{
    let mut table = ResultTable::new();
    let result = catch_unwind(AssertUnwindSafe(|| {
        worker.process(&items[range.clone()], &mut table, progress)
    }));

    let error = match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(payload) => Some(AnalysisError::WorkerPanic(panic_message(payload))),
    };

    debug!(
        "worker {} finished items {:?} with {} rows{}",
        index,
        range,
        table.len(),
        if error.is_some() { " (failed)" } else { "" }
    );

    WorkerOutcome {
        worker: index,
        items: range,
        table,
        error,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic payload")
    }
}
