//! Producer and consumer handles over a shared future state.
//!
//! A [`Promise`] is the producer side: worker threads report lifecycle
//! transitions, results, and progress through it. A [`Future`] is the
//! consumer side: any number of independent threads may hold one, query it,
//! block on it, or attach observers to it. Both are cheap clones of the same
//! reference-counted state; the state is destroyed when the last handle or
//! watcher drops.
//!
//! # Example
//!
//! ```
//! use filament::Promise;
//!
//! let promise = Promise::<String>::new();
//! let future = promise.future();
//!
//! let producer = std::thread::spawn(move || {
//!     promise.report_started();
//!     promise.report_result(0, "hello".to_string()).unwrap();
//!     promise.report_finished();
//! });
//!
//! assert_eq!(future.result(0), Some("hello".to_string()));
//! future.wait_for_finished();
//! producer.join().unwrap();
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::event::FutureEvent;
use crate::observer::{FutureWatcher, ObserverEntry, ObserverId};
use crate::state::FutureState;

/// Producer-side handle to an asynchronous computation.
///
/// Cloneable so several worker threads can publish into the same future;
/// producers must partition the result index space disjointly.
pub struct Promise<T: Send + 'static> {
    state: Arc<FutureState<T>>,
}

impl<T: Send + 'static> Promise<T> {
    /// Create a fresh promise in the pre-run state.
    pub fn new() -> Self {
        Self {
            state: FutureState::new(),
        }
    }

    /// A consumer handle to the same computation.
    pub fn future(&self) -> Future<T> {
        Future {
            state: self.state.clone(),
        }
    }

    /// Transition into the running state and broadcast `Started`.
    /// At most once per lifetime; repeat calls are no-ops.
    pub fn report_started(&self) {
        self.state.report_started();
    }

    /// Publish the result at `index`.
    ///
    /// Fails with [`FutureError::InvalidState`](crate::FutureError::InvalidState)
    /// once the future is finished, and with
    /// [`FutureError::DuplicateIndex`](crate::FutureError::DuplicateIndex) if
    /// the slot is already populated. Results reported after a cancel are
    /// accepted (they were already in flight) but generate no call-out.
    pub fn report_result(&self, index: usize, value: T) -> Result<()> {
        self.state.report_result(index, value)
    }

    /// Publish a contiguous run of results starting at `begin`.
    pub fn report_results(&self, begin: usize, values: Vec<T>) -> Result<()> {
        self.state.report_results(begin, values)
    }

    /// Declare the total number of results this future will produce.
    /// Also drives automatic progress reporting.
    pub fn set_expected_result_count(&self, count: usize) -> Result<()> {
        self.state.set_expected_result_count(count)
    }

    /// Set the progress range. Switches the future to manual progress.
    pub fn set_progress_range(&self, minimum: i32, maximum: i32) -> Result<()> {
        self.state.set_progress_range(minimum, maximum)
    }

    /// Advance the progress value. Values are clamped to the range;
    /// equal or regressing values are dropped.
    pub fn set_progress_value(&self, value: i32) -> Result<()> {
        self.state.set_progress_value(value, None)
    }

    /// Advance the progress value together with status text.
    pub fn set_progress_value_and_text(&self, value: i32, text: impl Into<String>) -> Result<()> {
        self.state.set_progress_value(value, Some(text.into()))
    }

    /// Flip the successful terminal state, wake all waiters, and deliver
    /// `Finished` after every earlier `ResultsReady`. Idempotent.
    pub fn report_finished(&self) {
        self.state.report_finished();
    }

    /// Flip the canceled state and wake all waiters.
    pub fn report_canceled(&self) {
        self.state.report_canceled();
    }

    /// Whether cancellation has been observed. Cheap (atomic load); workers
    /// poll this between blocks.
    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.state.is_canceled()
    }

    /// Whether the future is paused. Cheap (atomic load).
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    /// Block while paused; returns when resumed or terminal.
    pub fn wait_for_resume(&self) {
        self.state.wait_for_resume();
    }
}

impl<T: Send + 'static> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("started", &self.state.is_started())
            .field("finished", &self.state.is_finished())
            .field("canceled", &self.state.is_canceled())
            .finish()
    }
}

/// Consumer-side handle to an asynchronous computation.
///
/// Queryable and waitable independently of who produces the results. All
/// methods are safe to call concurrently from any number of threads.
pub struct Future<T: Send + 'static> {
    state: Arc<FutureState<T>>,
}

impl<T: Send + 'static> Future<T> {
    /// Whether production has started.
    pub fn is_started(&self) -> bool {
        self.state.is_started()
    }

    /// Whether the future is started but not yet terminal.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Whether the future finished successfully.
    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Whether the future was canceled.
    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.state.is_canceled()
    }

    /// Whether the future is paused.
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    /// Request cooperative cancellation. Results already computed stay
    /// readable; the kernel stops claiming new work once it observes the
    /// flag (block-granular).
    pub fn cancel(&self) {
        self.state.report_canceled();
    }

    /// Pause or resume work scheduling. Idempotent toggle; a paused future
    /// still accepts results that were already being computed.
    pub fn set_paused(&self, paused: bool) {
        self.state.set_paused(paused);
    }

    /// Current progress value.
    pub fn progress_value(&self) -> i32 {
        self.state.progress_value()
    }

    /// Lower bound of the progress range.
    pub fn progress_minimum(&self) -> i32 {
        self.state.progress_minimum()
    }

    /// Upper bound of the progress range.
    pub fn progress_maximum(&self) -> i32 {
        self.state.progress_maximum()
    }

    /// Status text of the latest progress update, if any.
    pub fn progress_text(&self) -> Option<String> {
        self.state.progress_text()
    }

    /// Declared total result count, when known.
    pub fn expected_result_count(&self) -> Option<usize> {
        self.state.expected_result_count()
    }

    /// Length of the gap-free result prefix `[0..k)` — the portion safe to
    /// iterate in order right now.
    pub fn result_count(&self) -> usize {
        self.state.result_count()
    }

    /// Total results stored so far, contiguous or not.
    pub fn total_result_count(&self) -> usize {
        self.state.total_result_count()
    }

    /// Block until the result at `index` is available (or the future is
    /// terminal), then return it. `None` when the future ended without
    /// producing that index.
    pub fn result(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.state.wait_for_result(index)
    }

    /// Non-blocking result lookup.
    pub fn peek(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.state.peek(index)
    }

    /// Block until the future reaches a terminal state.
    ///
    /// A producer that never terminates blocks this caller indefinitely; use
    /// [`wait_for_finished_timeout`](Self::wait_for_finished_timeout) to
    /// bound the wait.
    pub fn wait_for_finished(&self) {
        self.state.wait_for_finished();
    }

    /// Bounded wait for a terminal state. Returns `true` iff the future was
    /// terminal before the timeout expired. A timeout leaves the background
    /// computation running untouched.
    pub fn wait_for_finished_timeout(&self, timeout: Duration) -> bool {
        self.state.wait_for_finished_timeout(timeout)
    }

    /// Attach an inline observer callback.
    ///
    /// The callback runs synchronously on whichever thread dispatches an
    /// event, so it must be fast and must not block. A late attach first
    /// receives a replay of the future's history. Returns a token for
    /// [`detach`](Self::detach).
    ///
    /// The callback must not call `detach` on its own registration; use a
    /// [`watch`](Self::watch)-based observer if it needs to unsubscribe from
    /// within the event stream.
    pub fn attach_observer<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&FutureEvent) + Send + Sync + 'static,
    {
        self.state.attach(ObserverEntry::with_callback(callback))
    }

    /// Attach a queued-delivery observer and return its watcher.
    ///
    /// Events are pushed into the watcher's own queue and consumed at a time
    /// of the watcher's choosing. A late watcher first receives a replay of
    /// the future's history. The watcher detaches itself on drop.
    pub fn watch(&self) -> FutureWatcher<T> {
        let (entry, receiver) = ObserverEntry::with_channel();
        let id = self.state.attach(entry);
        FutureWatcher::new(self.clone(), id, receiver)
    }

    /// Detach an observer registration.
    ///
    /// Synchronous with respect to in-flight dispatch: once this returns, no
    /// further event reaches the observer, even if a dispatch pass was
    /// running concurrently. Returns `false` for an unknown or already
    /// detached token.
    pub fn detach(&self, id: ObserverId) -> bool {
        self.state.detach(id)
    }

    /// Number of currently attached observers.
    pub fn observer_count(&self) -> usize {
        self.state.observer_count()
    }
}

impl<T: Send + 'static> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("started", &self.is_started())
            .field("finished", &self.is_finished())
            .field("canceled", &self.is_canceled())
            .field("paused", &self.is_paused())
            .field("result_count", &self.result_count())
            .finish()
    }
}

// The whole point of these handles is to cross threads freely.
static_assertions::assert_impl_all!(Promise<i32>: Send, Sync);
static_assertions::assert_impl_all!(Future<i32>: Send, Sync);
