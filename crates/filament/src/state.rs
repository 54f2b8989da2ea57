//! The shared future core: lifecycle state, progress, results, observers.
//!
//! One [`FutureState`] is shared (via `Arc`) by every [`Promise`](crate::Promise)
//! and [`Future`](crate::Future) handle and by every observer registration. A
//! single `parking_lot::Mutex` guards the inner struct; a `Condvar` wakes
//! blocked waiters on every satisfying transition. The canceled and paused
//! bits are mirrored in atomics so kernel workers can poll them between
//! blocks without taking the lock.
//!
//! # Call-out dispatch
//!
//! Observer callbacks must never run under the state lock (a callback is free
//! to query the future back), yet each observer must see events in the order
//! they were generated, and `Finished` must arrive after every earlier
//! `ResultsReady`. Both properties come from a single mechanism: events are
//! appended under the lock to a pending queue, paired with a snapshot of the
//! observers registered at that moment, and one thread at a time drains the
//! queue with the lock released around each delivery. Late subscribers get a
//! replay of the future's history appended to the same queue, targeted only
//! at the new registration, so nothing is delivered twice.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use slotmap::SlotMap;

use crate::error::{FutureError, Result};
use crate::event::FutureEvent;
use crate::observer::{ObserverEntry, ObserverId};
use crate::store::ResultStore;

/// One queued call-out: an event plus the observers it must reach.
struct PendingCallOut {
    event: FutureEvent,
    targets: Vec<Arc<ObserverEntry>>,
}

/// Mutex-guarded interior of a future.
struct Inner<T> {
    started: bool,
    finished: bool,
    canceled: bool,
    paused: bool,

    progress_value: i32,
    progress_minimum: i32,
    progress_maximum: i32,
    progress_text: Option<String>,
    has_progress_range: bool,
    progress_reported: bool,
    /// Once a caller drives progress explicitly, automatic per-result
    /// progress updates stop.
    manual_progress: bool,

    expected_result_count: Option<usize>,
    store: ResultStore<T>,
    /// Every published range, in publication order, kept for late-subscriber
    /// replay.
    reported_ranges: Vec<(usize, usize)>,
    /// Results published but not yet handed to any observer context.
    pending_results: usize,

    observers: SlotMap<ObserverId, Arc<ObserverEntry>>,
    pending: VecDeque<PendingCallOut>,
    /// True while some thread is draining `pending`.
    dispatching: bool,
}

/// The shared state behind `Promise`/`Future` handles.
///
/// All mutation goes through the operations below; fields are never exposed.
pub(crate) struct FutureState<T> {
    inner: Mutex<Inner<T>>,
    waiters: Condvar,
    canceled: AtomicBool,
    paused: AtomicBool,
}

impl<T: Send + 'static> FutureState<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                started: false,
                finished: false,
                canceled: false,
                paused: false,
                progress_value: 0,
                progress_minimum: 0,
                progress_maximum: 0,
                progress_text: None,
                has_progress_range: false,
                progress_reported: false,
                manual_progress: false,
                expected_result_count: None,
                store: ResultStore::new(),
                reported_ranges: Vec::new(),
                pending_results: 0,
                observers: SlotMap::with_key(),
                pending: VecDeque::new(),
                dispatching: false,
            }),
            waiters: Condvar::new(),
            canceled: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        })
    }

    // ---------------------------------------------------------------------
    // Producer operations
    // ---------------------------------------------------------------------

    /// Transition into the running state and broadcast `Started`.
    ///
    /// At most once per lifetime; later calls (or calls on a terminal
    /// future) are silent no-ops.
    pub(crate) fn report_started(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.started || inner.finished || inner.canceled {
                return;
            }
            inner.started = true;
            tracing::debug!(target: "filament::state", "future started");
            Self::queue_event(&mut inner, FutureEvent::Started);
        }
        self.drain_call_outs();
    }

    /// Publish a single result at `index`.
    pub(crate) fn report_result(&self, index: usize, value: T) -> Result<()> {
        self.report_results(index, vec![value])
    }

    /// Publish a contiguous run of results starting at `begin`.
    ///
    /// Rejected with [`FutureError::InvalidState`] once finished. After a
    /// cancel the results are still accepted and stored — in-flight producer
    /// writes are allowed to land, and the values stay readable — but no
    /// call-out is generated and no new work should be scheduled.
    pub(crate) fn report_results(&self, begin: usize, values: Vec<T>) -> Result<()> {
        let count = values.len();
        if count == 0 {
            return Ok(());
        }
        {
            let mut inner = self.inner.lock();
            if inner.finished {
                return Err(FutureError::InvalidState);
            }
            inner.store.insert_batch(begin, values)?;
            if inner.canceled {
                tracing::trace!(
                    target: "filament::state",
                    begin,
                    count,
                    "results landed after cancel; stored without call-out"
                );
                self.waiters.notify_all();
                return Ok(());
            }
            inner.reported_ranges.push((begin, begin + count));
            inner.pending_results += count;
            if !inner.manual_progress && inner.expected_result_count.is_some() {
                let total = inner.store.total_count();
                let value = i32::try_from(total).unwrap_or(i32::MAX);
                Self::update_progress(&mut inner, value, None);
            }
            Self::queue_event(
                &mut inner,
                FutureEvent::ResultsReady {
                    begin,
                    end: begin + count,
                },
            );
            self.waiters.notify_all();
        }
        self.drain_call_outs();
        Ok(())
    }

    /// Declare the total number of results this future will produce.
    ///
    /// Also seeds the progress range `0..n` unless progress is being driven
    /// manually.
    pub(crate) fn set_expected_result_count(&self, count: usize) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.finished || inner.canceled {
                return Err(FutureError::InvalidState);
            }
            inner.expected_result_count = Some(count);
            if !inner.manual_progress {
                let maximum = i32::try_from(count).unwrap_or(i32::MAX);
                Self::update_progress_range(&mut inner, 0, maximum);
            }
        }
        self.drain_call_outs();
        Ok(())
    }

    /// Set the progress range and broadcast `ProgressRange` on change.
    pub(crate) fn set_progress_range(&self, minimum: i32, maximum: i32) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.finished || inner.canceled {
                return Err(FutureError::InvalidState);
            }
            inner.manual_progress = true;
            Self::update_progress_range(&mut inner, minimum, maximum);
        }
        self.drain_call_outs();
        Ok(())
    }

    /// Advance the progress value, optionally with status text.
    ///
    /// Values are clamped to the progress range and must advance: equal or
    /// regressing values are dropped (the coalescing contract only promises
    /// that the last value before `Finished` is delivered). Calling this
    /// switches the future to manual progress.
    pub(crate) fn set_progress_value(&self, value: i32, text: Option<String>) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.finished || inner.canceled {
                return Err(FutureError::InvalidState);
            }
            inner.manual_progress = true;
            Self::update_progress(&mut inner, value, text);
        }
        self.drain_call_outs();
        Ok(())
    }

    /// Flip the successful terminal state. Idempotent: repeat calls are
    /// no-ops and no second `Finished` event is generated.
    ///
    /// The pending call-out queue is appended to under the same lock hold
    /// that flips the bit, so every observer sees all earlier `ResultsReady`
    /// events before `Finished`.
    pub(crate) fn report_finished(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.finished || inner.canceled {
                return;
            }
            inner.finished = true;
            inner.paused = false;
            self.paused.store(false, Ordering::Release);
            tracing::debug!(
                target: "filament::state",
                results = inner.store.total_count(),
                pending = inner.pending_results,
                "future finished"
            );
            Self::queue_event(&mut inner, FutureEvent::Finished);
            self.waiters.notify_all();
        }
        self.drain_call_outs();
    }

    /// Flip the canceled state and wake all waiters. No-op once terminal.
    pub(crate) fn report_canceled(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.finished || inner.canceled {
                return;
            }
            inner.canceled = true;
            // Cancel implies resume so paused workers can observe it and stop.
            inner.paused = false;
            self.canceled.store(true, Ordering::Release);
            self.paused.store(false, Ordering::Release);
            tracing::debug!(
                target: "filament::state",
                results = inner.store.total_count(),
                "future canceled"
            );
            Self::queue_event(&mut inner, FutureEvent::Canceled);
            self.waiters.notify_all();
        }
        self.drain_call_outs();
    }

    /// Idempotent pause toggle. A paused future keeps accepting results that
    /// were already being computed; it only signals the kernel (via a polled
    /// flag) to stop claiming new work.
    pub(crate) fn set_paused(&self, paused: bool) {
        {
            let mut inner = self.inner.lock();
            if inner.finished || inner.canceled || inner.paused == paused {
                return;
            }
            inner.paused = paused;
            self.paused.store(paused, Ordering::Release);
            let event = if paused {
                FutureEvent::Paused
            } else {
                FutureEvent::Resumed
            };
            Self::queue_event(&mut inner, event);
            self.waiters.notify_all();
        }
        self.drain_call_outs();
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub(crate) fn is_started(&self) -> bool {
        self.inner.lock().started
    }

    pub(crate) fn is_running(&self) -> bool {
        let inner = self.inner.lock();
        inner.started && !inner.finished && !inner.canceled
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }

    #[inline]
    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub(crate) fn progress_value(&self) -> i32 {
        self.inner.lock().progress_value
    }

    pub(crate) fn progress_minimum(&self) -> i32 {
        self.inner.lock().progress_minimum
    }

    pub(crate) fn progress_maximum(&self) -> i32 {
        self.inner.lock().progress_maximum
    }

    pub(crate) fn progress_text(&self) -> Option<String> {
        self.inner.lock().progress_text.clone()
    }

    pub(crate) fn expected_result_count(&self) -> Option<usize> {
        self.inner.lock().expected_result_count
    }

    /// Length of the gap-free result prefix.
    pub(crate) fn result_count(&self) -> usize {
        self.inner.lock().store.contiguous_count()
    }

    /// Total results stored, contiguous or not.
    pub(crate) fn total_result_count(&self) -> usize {
        self.inner.lock().store.total_count()
    }

    // ---------------------------------------------------------------------
    // Blocking waits
    // ---------------------------------------------------------------------

    /// Non-blocking result lookup.
    pub(crate) fn peek(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.inner.lock().store.get(index).cloned()
    }

    /// Block until the result at `index` is part of the contiguous prefix or
    /// the future is terminal, then return whatever is stored there.
    pub(crate) fn wait_for_result(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        let mut inner = self.inner.lock();
        loop {
            if inner.store.contiguous_count() > index || inner.finished || inner.canceled {
                return inner.store.get(index).cloned();
            }
            self.waiters.wait(&mut inner);
        }
    }

    /// Block until the future reaches a terminal state.
    ///
    /// A future whose producer never terminates blocks this caller forever;
    /// use [`wait_for_finished_timeout`](Self::wait_for_finished_timeout) to
    /// bound the wait.
    pub(crate) fn wait_for_finished(&self) {
        let mut inner = self.inner.lock();
        while !(inner.finished || inner.canceled) {
            self.waiters.wait(&mut inner);
        }
    }

    /// Bounded wait for a terminal state. Returns whether the future was
    /// terminal before the timeout expired; a timeout leaves the computation
    /// running untouched.
    pub(crate) fn wait_for_finished_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !(inner.finished || inner.canceled) {
            if self.waiters.wait_until(&mut inner, deadline).timed_out() {
                return inner.finished || inner.canceled;
            }
        }
        true
    }

    /// Block while the future is paused. Returns when resumed or terminal.
    pub(crate) fn wait_for_resume(&self) {
        let mut inner = self.inner.lock();
        while inner.paused && !inner.finished && !inner.canceled {
            self.waiters.wait(&mut inner);
        }
    }

    // ---------------------------------------------------------------------
    // Observer registration and call-out dispatch
    // ---------------------------------------------------------------------

    /// Attach a registration and queue a replay of the future's history for
    /// it: `Started`, every published range in publication order, the current
    /// progress, the paused flag, then the terminal state if already reached.
    ///
    /// The replay is composed and queued under the same lock hold that
    /// inserts the registration, so events generated afterwards (which will
    /// include the new observer in their snapshots) land behind it, and
    /// events queued before it (whose snapshots exclude the new observer)
    /// cannot be delivered twice.
    pub(crate) fn attach(&self, entry: Arc<ObserverEntry>) -> ObserverId {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.observers.insert(entry.clone());
            let replay = Self::replay_events(&inner);
            tracing::debug!(
                target: "filament::state",
                replayed = replay.len(),
                "observer attached"
            );
            for event in replay {
                inner.pending.push_back(PendingCallOut {
                    event,
                    targets: vec![entry.clone()],
                });
            }
            id
        };
        self.drain_call_outs();
        id
    }

    /// Detach a registration.
    ///
    /// Synchronous with respect to in-flight dispatch: by the time this
    /// returns, any dispatch pass that started before the call has either
    /// delivered to or definitively skipped this observer, and nothing will
    /// be delivered afterwards.
    pub(crate) fn detach(&self, id: ObserverId) -> bool {
        let entry = self.inner.lock().observers.remove(id);
        match entry {
            Some(entry) => {
                // Blocks until a concurrent deliver() to this entry returns.
                entry.detach();
                tracing::debug!(target: "filament::state", "observer detached");
                true
            }
            None => false,
        }
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }

    /// Queue one event for every currently registered observer.
    ///
    /// Must be called with the lock held; delivery happens later in
    /// [`drain_call_outs`](Self::drain_call_outs). When nobody is listening
    /// the event is not queued at all — late subscribers are served from the
    /// replay instead.
    fn queue_event(inner: &mut Inner<T>, event: FutureEvent) {
        if inner.observers.is_empty() {
            if matches!(event, FutureEvent::ResultsReady { .. }) {
                // No observer context to deliver to; replay serves late subscribers.
                inner.pending_results = 0;
            }
            return;
        }
        let targets: Vec<Arc<ObserverEntry>> = inner.observers.values().cloned().collect();
        inner.pending.push_back(PendingCallOut { event, targets });
    }

    /// Drain the pending call-out queue, delivering with the lock released.
    ///
    /// Only one thread drains at a time; others that queued an event while a
    /// drain is running simply leave it to the active drainer. This
    /// serializes delivery per future, which is what gives each observer the
    /// generation order.
    fn drain_call_outs(&self) {
        let mut inner = self.inner.lock();
        if inner.dispatching {
            return;
        }
        inner.dispatching = true;
        while let Some(call_out) = inner.pending.pop_front() {
            if let FutureEvent::ResultsReady { begin, end } = call_out.event {
                inner.pending_results = inner.pending_results.saturating_sub(end - begin);
            }
            MutexGuard::unlocked(&mut inner, || {
                for target in &call_out.targets {
                    target.deliver(&call_out.event);
                }
            });
        }
        inner.dispatching = false;
    }

    /// The event history a late subscriber must observe, in order.
    fn replay_events(inner: &Inner<T>) -> Vec<FutureEvent> {
        let mut events = Vec::new();
        if inner.started {
            events.push(FutureEvent::Started);
        }
        for &(begin, end) in &inner.reported_ranges {
            events.push(FutureEvent::ResultsReady { begin, end });
        }
        if inner.has_progress_range {
            events.push(FutureEvent::ProgressRange {
                minimum: inner.progress_minimum,
                maximum: inner.progress_maximum,
            });
        }
        if inner.progress_reported {
            events.push(FutureEvent::Progress {
                value: inner.progress_value,
                text: inner.progress_text.clone(),
            });
        }
        if inner.paused {
            events.push(FutureEvent::Paused);
        }
        if inner.canceled {
            events.push(FutureEvent::Canceled);
        } else if inner.finished {
            events.push(FutureEvent::Finished);
        }
        events
    }

    // ---------------------------------------------------------------------
    // Progress helpers (lock held)
    // ---------------------------------------------------------------------

    fn update_progress_range(inner: &mut Inner<T>, minimum: i32, maximum: i32) {
        let (minimum, maximum) = if minimum <= maximum {
            (minimum, maximum)
        } else {
            (maximum, minimum)
        };
        if inner.has_progress_range
            && inner.progress_minimum == minimum
            && inner.progress_maximum == maximum
        {
            return;
        }
        inner.has_progress_range = true;
        inner.progress_minimum = minimum;
        inner.progress_maximum = maximum;
        inner.progress_value = inner.progress_value.clamp(minimum, maximum);
        Self::queue_event(inner, FutureEvent::ProgressRange { minimum, maximum });
    }

    fn update_progress(inner: &mut Inner<T>, value: i32, text: Option<String>) {
        let value = if inner.has_progress_range {
            value.clamp(inner.progress_minimum, inner.progress_maximum)
        } else {
            value
        };
        let advanced = !inner.progress_reported || value > inner.progress_value;
        let text_changed = text.is_some() && text != inner.progress_text;
        if !advanced && !text_changed {
            return;
        }
        if advanced {
            inner.progress_value = value;
        }
        if let Some(text) = text {
            inner.progress_text = Some(text);
        }
        inner.progress_reported = true;
        Self::queue_event(
            inner,
            FutureEvent::Progress {
                value: inner.progress_value,
                text: inner.progress_text.clone(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ObserverEntry;
    use parking_lot::Mutex as PlMutex;

    fn recording_entry() -> (Arc<ObserverEntry>, Arc<PlMutex<Vec<FutureEvent>>>) {
        let log = Arc::new(PlMutex::new(Vec::new()));
        let log_clone = log.clone();
        let entry = ObserverEntry::with_callback(move |event| {
            log_clone.lock().push(event.clone());
        });
        (entry, log)
    }

    #[test]
    fn test_started_is_once() {
        let state = FutureState::<i32>::new();
        let (entry, log) = recording_entry();
        state.attach(entry);

        state.report_started();
        state.report_started();

        let events = log.lock();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, FutureEvent::Started))
                .count(),
            1
        );
    }

    #[test]
    fn test_finished_idempotent() {
        let state = FutureState::<i32>::new();
        let (entry, log) = recording_entry();
        state.attach(entry);

        state.report_started();
        state.report_finished();
        state.report_finished();

        let finishes = log
            .lock()
            .iter()
            .filter(|e| matches!(e, FutureEvent::Finished))
            .count();
        assert_eq!(finishes, 1);
        assert!(state.is_finished());
    }

    #[test]
    fn test_results_rejected_after_finish() {
        let state = FutureState::<i32>::new();
        state.report_started();
        state.report_result(0, 1).unwrap();
        state.report_finished();

        assert_eq!(state.report_result(1, 2), Err(FutureError::InvalidState));
        assert_eq!(state.total_result_count(), 1);
    }

    #[test]
    fn test_results_land_after_cancel_without_call_out() {
        let state = FutureState::<i32>::new();
        let (entry, log) = recording_entry();
        state.attach(entry);

        state.report_started();
        state.report_result(0, 10).unwrap();
        state.report_canceled();
        // An in-flight producer write lands but stays silent.
        state.report_result(1, 20).unwrap();

        assert_eq!(state.peek(1), Some(20));
        let ready_after_cancel = log
            .lock()
            .iter()
            .skip_while(|e| !matches!(e, FutureEvent::Canceled))
            .filter(|e| matches!(e, FutureEvent::ResultsReady { .. }))
            .count();
        assert_eq!(ready_after_cancel, 0);
    }

    #[test]
    fn test_event_order_results_before_finished() {
        let state = FutureState::<usize>::new();
        let (entry, log) = recording_entry();
        state.attach(entry);

        state.report_started();
        for i in 0..10 {
            state.report_result(i, i).unwrap();
        }
        state.report_finished();

        let events = log.lock();
        let finished_at = events
            .iter()
            .position(|e| matches!(e, FutureEvent::Finished))
            .expect("finished event");
        let last_ready = events
            .iter()
            .rposition(|e| matches!(e, FutureEvent::ResultsReady { .. }))
            .expect("results event");
        assert!(last_ready < finished_at);
    }

    #[test]
    fn test_late_attach_replays_history() {
        let state = FutureState::<usize>::new();
        state.report_started();
        state.report_results(0, (0..10).collect()).unwrap();
        state.report_finished();

        let (entry, log) = recording_entry();
        state.attach(entry);

        let events = log.lock().clone();
        assert_eq!(events.first(), Some(&FutureEvent::Started));
        assert_eq!(events.last(), Some(&FutureEvent::Finished));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, FutureEvent::Finished))
                .count(),
            1
        );
        let covered: usize = events
            .iter()
            .filter_map(|e| match e {
                FutureEvent::ResultsReady { begin, end } => Some(end - begin),
                _ => None,
            })
            .sum();
        assert_eq!(covered, 10);
    }

    #[test]
    fn test_progress_monotone_and_clamped() {
        let state = FutureState::<i32>::new();
        let (entry, log) = recording_entry();
        state.attach(entry);

        state.set_progress_range(0, 100).unwrap();
        state.set_progress_value(150, None).unwrap(); // clamps to 100
        state.set_progress_value(50, None).unwrap(); // regression, dropped

        assert_eq!(state.progress_value(), 100);
        let progress_events: Vec<i32> = log
            .lock()
            .iter()
            .filter_map(|e| match e {
                FutureEvent::Progress { value, .. } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(progress_events, vec![100]);
    }

    #[test]
    fn test_progress_rejected_after_terminal() {
        let state = FutureState::<i32>::new();
        state.report_started();
        state.report_finished();
        assert_eq!(
            state.set_progress_value(10, None),
            Err(FutureError::InvalidState)
        );
        assert_eq!(
            state.set_progress_range(0, 10),
            Err(FutureError::InvalidState)
        );
    }

    #[test]
    fn test_automatic_progress_from_results() {
        let state = FutureState::<usize>::new();
        let (entry, log) = recording_entry();
        state.attach(entry);

        state.set_expected_result_count(4).unwrap();
        state.report_started();
        state.report_results(0, vec![0, 1]).unwrap();
        state.report_results(2, vec![2, 3]).unwrap();

        assert_eq!(state.progress_value(), 4);
        assert_eq!(state.progress_maximum(), 4);
        let values: Vec<i32> = log
            .lock()
            .iter()
            .filter_map(|e| match e {
                FutureEvent::Progress { value, .. } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![2, 4]);
    }

    #[test]
    fn test_pause_resume_events() {
        let state = FutureState::<i32>::new();
        let (entry, log) = recording_entry();
        state.attach(entry);

        state.report_started();
        state.set_paused(true);
        state.set_paused(true); // idempotent
        assert!(state.is_paused());
        state.set_paused(false);
        assert!(!state.is_paused());

        let events = log.lock();
        let seq: Vec<FutureEvent> = events
            .iter()
            .filter(|e| matches!(e, FutureEvent::Paused | FutureEvent::Resumed))
            .cloned()
            .collect();
        assert_eq!(seq, vec![FutureEvent::Paused, FutureEvent::Resumed]);
    }

    #[test]
    fn test_wait_for_result_blocks_until_available() {
        let state = FutureState::<i32>::new();
        let state_clone = state.clone();
        let producer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            state_clone.report_started();
            state_clone.report_result(0, 7).unwrap();
        });

        assert_eq!(state.wait_for_result(0), Some(7));
        producer.join().unwrap();
    }

    #[test]
    fn test_wait_for_finished_timeout() {
        let state = FutureState::<i32>::new();
        state.report_started();
        // Never finishes: must time out.
        assert!(!state.wait_for_finished_timeout(Duration::from_millis(20)));

        state.report_finished();
        // Already terminal: returns immediately.
        assert!(state.wait_for_finished_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_cancel_wakes_waiters() {
        let state = FutureState::<i32>::new();
        state.report_started();
        let state_clone = state.clone();
        let canceler = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            state_clone.report_canceled();
        });

        state.wait_for_finished();
        assert!(state.is_canceled());
        canceler.join().unwrap();
    }

    #[test]
    fn test_cancel_clears_pause() {
        let state = FutureState::<i32>::new();
        state.report_started();
        state.set_paused(true);
        state.report_canceled();
        assert!(!state.is_paused());
        // wait_for_resume must not block on a canceled future.
        state.wait_for_resume();
    }

    #[test]
    fn test_detach_stops_delivery() {
        let state = FutureState::<i32>::new();
        let (entry, log) = recording_entry();
        let id = state.attach(entry);

        state.report_started();
        assert!(state.detach(id));
        assert!(!state.detach(id));
        state.report_result(0, 1).unwrap();

        let events = log.lock();
        assert!(
            events
                .iter()
                .all(|e| !matches!(e, FutureEvent::ResultsReady { .. }))
        );
    }
}
