//! The parallel iteration kernel.
//!
//! [`run_parallel`] drives a map-style loop over an index range on a worker
//! pool and returns immediately with a [`Future`] for the results. Workers
//! claim blocks of indices from a shared cursor, sized per worker by a
//! [`BlockSizeController`](crate::BlockSizeController), and publish each
//! finished block into the future. Cancellation and pause are polled between
//! blocks, never mid-block: block-granular control is a deliberate trade-off
//! favoring throughput over reaction latency.
//!
//! # Example
//!
//! ```no_run
//! use filament::run_parallel;
//!
//! let future = run_parallel(0..1000, |i| i * i, 4);
//! future.wait_for_finished();
//! assert_eq!(future.result(10), Some(100));
//! ```

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::blocksize::BlockSizeController;
use crate::future::{Future, Promise};
use crate::threadpool::ThreadPool;

/// Run `per_item` over every index in `range` on the global thread pool,
/// using `pool_size` workers.
///
/// Returns at once; the returned future fills in as blocks complete. Result
/// index `i - range.start` holds `per_item(i)`. Progress is reported
/// automatically against the range length.
pub fn run_parallel<T, F>(range: Range<usize>, per_item: F, pool_size: usize) -> Future<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    run_parallel_on(ThreadPool::global(), range, per_item, pool_size)
}

/// [`run_parallel`] on a caller-supplied pool.
pub fn run_parallel_on<T, F>(
    pool: &ThreadPool,
    range: Range<usize>,
    per_item: F,
    pool_size: usize,
) -> Future<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let promise = Promise::new();
    let future = promise.future();
    let iteration_count = range.len();

    // Pre-start setup cannot fail: the future is not terminal yet.
    let _ = promise.set_expected_result_count(iteration_count);
    promise.report_started();

    if iteration_count == 0 {
        promise.report_finished();
        return future;
    }

    let workers = pool_size.max(1);
    let cursor = Arc::new(AtomicUsize::new(range.start));
    let remaining_workers = Arc::new(AtomicUsize::new(workers));
    let per_item = Arc::new(per_item);

    tracing::debug!(
        target: "filament::kernel",
        iterations = iteration_count,
        workers,
        "starting parallel run"
    );

    for _ in 0..workers {
        let promise = promise.clone();
        let cursor = cursor.clone();
        let remaining_workers = remaining_workers.clone();
        let per_item = per_item.clone();
        let range = range.clone();

        pool.spawn(move || {
            let mut controller = BlockSizeController::new(iteration_count, workers);
            worker_loop(&promise, &cursor, &range, per_item.as_ref(), &mut controller);

            // Join barrier: the last worker out reports the terminal state,
            // after every published block has landed in the store.
            if remaining_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
                if promise.is_canceled() {
                    tracing::debug!(
                        target: "filament::kernel",
                        "parallel run canceled; workers drained"
                    );
                } else {
                    promise.report_finished();
                }
            }
        });
    }

    future
}

/// One worker's claim/run/publish/check loop.
///
/// The timing marks bracket only the user-code portion of each block, so the
/// controller sees claim, publish, and control checks as control-part time.
fn worker_loop<T, F>(
    promise: &Promise<T>,
    cursor: &AtomicUsize,
    range: &Range<usize>,
    per_item: &F,
    controller: &mut BlockSizeController,
) where
    T: Send + 'static,
    F: Fn(usize) -> T,
{
    loop {
        // CheckControl: block-granular, before claiming more work.
        if promise.is_canceled() {
            break;
        }
        if promise.is_paused() {
            promise.wait_for_resume();
            continue;
        }

        // ClaimBlock.
        let block = controller.block_size();
        let begin = cursor.fetch_add(block, Ordering::Relaxed);
        if begin >= range.end {
            break;
        }
        let end = (begin + block).min(range.end);

        // RunBlock.
        controller.time_before_user();
        let mut values = Vec::with_capacity(end - begin);
        for index in begin..end {
            values.push(per_item(index));
        }
        controller.time_after_user();

        // PublishResults. Rejection means the future turned terminal in a
        // way that no longer accepts results; stop claiming.
        if promise
            .report_results(begin - range.start, values)
            .is_err()
        {
            break;
        }
    }
}
