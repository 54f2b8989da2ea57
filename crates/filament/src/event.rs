//! Call-out events delivered from a future to its observers.
//!
//! Every lifecycle transition, progress update, and batch of published
//! results is represented as an immutable [`FutureEvent`] value. Events carry
//! indices and counters, never result values; an observer that wants the
//! values reads them through its [`Future`](crate::Future) handle. This keeps
//! events cheap to clone and lets one event fan out to any number of
//! observers.

/// A single notification from a future to a subscribed observer.
///
/// Events for one future are delivered to each observer in the order they
/// were generated. Across different observers there is no ordering guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FutureEvent {
    /// Production has started.
    Started,
    /// The future reached its successful terminal state. Delivered after
    /// every `ResultsReady` event generated before it.
    Finished,
    /// The future was canceled.
    Canceled,
    /// The future was paused.
    Paused,
    /// The future was resumed after a pause.
    Resumed,
    /// The progress value advanced.
    Progress {
        /// Current progress value, clamped to the progress range.
        value: i32,
        /// Optional status text accompanying the update.
        text: Option<String>,
    },
    /// The progress range was set or changed.
    ProgressRange {
        /// Lower bound of the progress range.
        minimum: i32,
        /// Upper bound of the progress range.
        maximum: i32,
    },
    /// Results for the half-open index range `begin..end` are available.
    ResultsReady {
        /// First index of the published range.
        begin: usize,
        /// One past the last index of the published range.
        end: usize,
    },
}

impl FutureEvent {
    /// Whether this event marks a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Canceled)
    }
}

/// How call-out events reach an observer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Invoke the observer callback synchronously on whichever thread
    /// generated (or is draining) the event.
    ///
    /// Fast, but the callback must be safe to run on any thread and must not
    /// detach its own registration (see [`Future::detach`](crate::Future::detach)).
    Inline,

    /// Queue the event into the observer's own channel, to be consumed at a
    /// time of the observer's choosing.
    ///
    /// This is the mode used by [`FutureWatcher`](crate::FutureWatcher) and
    /// is safe for observers living on other threads.
    #[default]
    Queued,
}
