//! Thread-safe futures for parallel producers, with observer fan-out and an
//! adaptive iteration kernel.
//!
//! This crate provides the concurrency core of a parallel-algorithm layer as
//! a standalone library primitive:
//!
//! - **Promise / Future**: one shared result object that many producer
//!   threads write into and many independent consumers query, block on, and
//!   observe — with out-of-order result indices, progress counters, and a
//!   cooperative cancel/pause/resume state machine
//! - **Observers**: ordered, de-duplicated lifecycle notifications fanned out
//!   to any number of late-subscribing and early-unsubscribing observers,
//!   either inline or queued into the observer's own channel
//! - **Iteration kernel**: [`run_parallel`] drives a map-style loop over an
//!   index range on a worker pool, with per-worker adaptive block sizing
//!   ([`BlockSizeController`]) that trades scheduling overhead against
//!   parallel throughput
//!
//! # Producer / consumer example
//!
//! ```
//! use filament::Promise;
//!
//! let promise = Promise::<u64>::new();
//! let future = promise.future();
//!
//! std::thread::spawn(move || {
//!     promise.report_started();
//!     for i in 0..4 {
//!         promise.report_result(i, (i as u64) * 10).unwrap();
//!     }
//!     promise.report_finished();
//! });
//!
//! // Blocks until index 3 is available.
//! assert_eq!(future.result(3), Some(30));
//! future.wait_for_finished();
//! ```
//!
//! # Watching a parallel run
//!
//! ```no_run
//! use filament::{run_parallel, FutureEvent};
//!
//! let future = run_parallel(0..10_000, |i| i * i, 4);
//! let watcher = future.watch();
//!
//! for event in watcher.drain_until_terminal() {
//!     if let FutureEvent::ResultsReady { begin, end } = event {
//!         println!("results {begin}..{end} ready");
//!     }
//! }
//! ```

mod blocksize;
mod error;
mod event;
mod future;
mod kernel;
mod observer;
mod state;
mod store;
mod threadpool;

pub use blocksize::{BlockSizeController, MonotonicClock, SystemClock};
pub use error::{FutureError, Result};
pub use event::{DeliveryMode, FutureEvent};
pub use future::{Future, Promise};
pub use kernel::{run_parallel, run_parallel_on};
pub use observer::{FutureWatcher, ObserverId};
pub use threadpool::{ThreadPool, ThreadPoolConfig};
