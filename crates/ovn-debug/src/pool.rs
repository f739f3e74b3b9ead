//! Fixed-size worker pool for per-node fan-out.
//!
//! `workers` futures pull items from a shared queue and run them one at a
//! time, each under its own timeout. Everything runs on the calling task, so
//! items may borrow from the caller. Results come back in input order once
//! every worker has drained the queue.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Worker count used for parallel fan-out.
pub const DEFAULT_WORKERS: usize = 5;

/// How a single item finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome<R> {
    Completed(R),
    /// The item exceeded its time budget and was cancelled.
    TimedOut,
}

/// Result for one queued item.
#[derive(Debug, Clone)]
pub struct PoolResult<T, R> {
    pub item: T,
    pub outcome: ItemOutcome<R>,
    pub elapsed: Duration,
}

/// Run `f` over `items` with at most `workers` items in flight.
///
/// A worker count of zero is treated as one (sequential).
pub async fn run_pool<T, R, F, Fut>(
    items: Vec<T>,
    workers: usize,
    per_item_timeout: Duration,
    f: F,
) -> Vec<PoolResult<T, R>>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, total);
    debug!(items = total, workers, "Starting worker pool");

    let queue: Mutex<VecDeque<(usize, T)>> = Mutex::new(items.into_iter().enumerate().collect());
    let queue = &queue;
    let f = &f;

    let worker = move |worker_id: usize| async move {
        let mut finished = Vec::new();
        loop {
            let next = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some((index, item)) = next else {
                break;
            };

            let started = Instant::now();
            let outcome = match timeout(per_item_timeout, f(item.clone())).await {
                Ok(result) => ItemOutcome::Completed(result),
                Err(_) => {
                    warn!(
                        worker = worker_id,
                        index,
                        timeout_secs = per_item_timeout.as_secs(),
                        "Work item timed out"
                    );
                    ItemOutcome::TimedOut
                }
            };
            finished.push((
                index,
                PoolResult {
                    item,
                    outcome,
                    elapsed: started.elapsed(),
                },
            ));
        }
        finished
    };

    let mut results: Vec<(usize, PoolResult<T, R>)> = join_all((0..workers).map(worker))
        .await
        .into_iter()
        .flatten()
        .collect();
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}
