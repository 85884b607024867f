//! Bounded fan-out over a list of items.
//!
//! Every stage of the workflow runs through [`bounded_map_reduce`]: one
//! spawned task per item, gated by a counting semaphore, with results folded
//! into a shared accumulator behind its own lock.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Cap used when a caller passes zero.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Marker handed to the reducer when an operation panicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panicked;

/// What a successful per-item operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    /// The operation found nothing to do for this item.
    Skipped,
}

/// Counters for one stage of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunStats {
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    pub fn record_skip(&mut self) {
        self.processed += 1;
        self.skipped += 1;
    }

    pub fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded => self.record_success(),
            ItemOutcome::Skipped => self.record_skip(),
        }
    }
}

fn effective_concurrency(concurrency: usize) -> usize {
    if concurrency == 0 {
        tracing::warn!(
            default = DEFAULT_CONCURRENCY,
            "executor: zero concurrency cap replaced by default"
        );
        DEFAULT_CONCURRENCY
    } else {
        concurrency
    }
}

/// Run `op` for every item with at most `concurrency` operations in flight
/// and fold each result into an accumulator with `reduce`.
///
/// Blocks until every operation has finished. Items are processed in no
/// particular order. A panicking operation reaches the reducer as
/// `Err(Panicked)` instead of tearing down the run.
pub async fn bounded_map_reduce<T, R, A, Op, Fut, F>(
    items: Vec<T>,
    concurrency: usize,
    op: Op,
    reduce: F,
) -> A
where
    T: Send + 'static,
    R: Send + 'static,
    A: Default + Send + 'static,
    Op: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    F: Fn(&mut A, Result<R, Panicked>) + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(effective_concurrency(concurrency)));
    let op = Arc::new(op);
    let reduce = Arc::new(reduce);
    let acc = Arc::new(Mutex::new(A::default()));
    let mut tasks = JoinSet::new();

    for item in items {
        // The semaphore is owned here and never closed.
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let op = Arc::clone(&op);
        let reduce = Arc::clone(&reduce);
        let acc = Arc::clone(&acc);

        tasks.spawn(async move {
            let _permit = permit;
            let result = AssertUnwindSafe(async move { op(item).await })
                .catch_unwind()
                .await
                .map_err(|_| Panicked);
            let mut guard = acc.lock().unwrap_or_else(PoisonError::into_inner);
            reduce(&mut *guard, result);
        });
    }

    while tasks.join_next().await.is_some() {}

    let mut guard = acc.lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::take(&mut *guard)
}

/// [`bounded_map_reduce`] specialised to per-item success/skip/failure
/// counting. Failures are logged with the item and stage name.
pub async fn run_bounded<T, Op, Fut, E>(
    stage: &'static str,
    items: Vec<T>,
    concurrency: usize,
    op: Op,
) -> RunStats
where
    T: Display + Clone + Send + 'static,
    Op: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ItemOutcome, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    bounded_map_reduce(
        items,
        concurrency,
        move |item: T| {
            let id = item.clone();
            let fut = op(item);
            async move { (id, fut.await) }
        },
        move |stats: &mut RunStats, result| match result {
            Ok((_, Ok(outcome))) => stats.record(outcome),
            Ok((id, Err(e))) => {
                tracing::error!(stage, item = %id, error = %e, "executor: item failed");
                stats.record_failure();
            }
            Err(Panicked) => {
                tracing::error!(stage, "executor: item operation panicked");
                stats.record_failure();
            }
        },
    )
    .await
}
