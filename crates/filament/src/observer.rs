//! Observer registrations and the watcher handle.
//!
//! An observer is a (sink, delivery-mode) pair attached to a future. The sink
//! is either an inline callback invoked on the dispatching thread, or a
//! channel feeding a [`FutureWatcher`] that consumes events at a time of its
//! own choosing.
//!
//! # Detach race
//!
//! Detaching must be safe to call while a dispatch pass is in flight on
//! another thread: once `detach` returns, the observer's backing resources
//! may be freed, so no event may reach it afterwards. Each registration
//! therefore keeps its sink behind its own small mutex. Delivery locks the
//! sink, checks for detach, and delivers; detach takes the sink out under the
//! same mutex, which blocks exactly until any in-flight delivery to this
//! observer has completed. A plain atomic removal from the observer table
//! would not be enough.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use parking_lot::Mutex;
use slotmap::new_key_type;

use crate::event::{DeliveryMode, FutureEvent};
use crate::future::Future;

new_key_type! {
    /// Detach token returned when an observer is attached to a future.
    ///
    /// Pass it to [`Future::detach`] to remove the registration. The token
    /// stays valid until the observer is detached or the future's state is
    /// dropped, whichever comes first.
    pub struct ObserverId;
}

/// Where delivered events go.
enum ObserverSink {
    Inline(Box<dyn Fn(&FutureEvent) + Send + Sync>),
    Queued(Sender<FutureEvent>),
}

impl ObserverSink {
    fn mode(&self) -> DeliveryMode {
        match self {
            Self::Inline(_) => DeliveryMode::Inline,
            Self::Queued(_) => DeliveryMode::Queued,
        }
    }
}

/// A single observer registration, shared between the future's observer
/// table and any in-flight dispatch snapshots.
pub(crate) struct ObserverEntry {
    /// `None` once detached. The mutex is the detach synchronization point.
    sink: Mutex<Option<ObserverSink>>,
}

impl ObserverEntry {
    /// Registration with an inline callback sink.
    pub(crate) fn with_callback<F>(callback: F) -> Arc<Self>
    where
        F: Fn(&FutureEvent) + Send + Sync + 'static,
    {
        Arc::new(Self {
            sink: Mutex::new(Some(ObserverSink::Inline(Box::new(callback)))),
        })
    }

    /// Registration with a queued channel sink. Returns the consuming end.
    pub(crate) fn with_channel() -> (Arc<Self>, Receiver<FutureEvent>) {
        let (sender, receiver) = unbounded();
        let entry = Arc::new(Self {
            sink: Mutex::new(Some(ObserverSink::Queued(sender))),
        });
        (entry, receiver)
    }

    /// Deliver one event, or skip it if the observer has detached.
    pub(crate) fn deliver(&self, event: &FutureEvent) {
        let guard = self.sink.lock();
        match &*guard {
            Some(sink) => {
                tracing::trace!(
                    target: "filament::observer",
                    mode = ?sink.mode(),
                    event = ?event,
                    "delivering call-out"
                );
                match sink {
                    ObserverSink::Inline(callback) => callback(event),
                    // A closed channel means the watcher is gone; drop the event.
                    ObserverSink::Queued(sender) => {
                        let _ = sender.send(event.clone());
                    }
                }
            }
            None => {
                tracing::trace!(
                    target: "filament::observer",
                    event = ?event,
                    "skipping call-out to detached observer"
                );
            }
        }
    }

    /// Tear the sink out. Blocks until any in-flight [`deliver`](Self::deliver)
    /// call on another thread has completed, which is what makes detach safe.
    pub(crate) fn detach(&self) {
        *self.sink.lock() = None;
    }
}

/// A queued-delivery observer of a future's lifecycle and result events.
///
/// Created by [`Future::watch`]. Events are pushed into the watcher's own
/// queue by producer threads and consumed here, so the watcher never shares a
/// thread with producers unless it wants to. Dropping the watcher detaches it.
///
/// A watcher attached after events have already occurred receives a replay of
/// the future's history first (started, every published result range, current
/// progress, terminal state), so late subscription observes a consistent
/// sequence.
///
/// # Example
///
/// ```
/// use filament::{FutureEvent, Promise};
///
/// let promise = Promise::<i32>::new();
/// let watcher = promise.future().watch();
///
/// promise.report_started();
/// promise.report_result(0, 42).unwrap();
/// promise.report_finished();
///
/// let events = watcher.drain();
/// assert_eq!(events.first(), Some(&FutureEvent::Started));
/// assert_eq!(events.last(), Some(&FutureEvent::Finished));
/// ```
pub struct FutureWatcher<T: Send + 'static> {
    future: Future<T>,
    id: ObserverId,
    receiver: Receiver<FutureEvent>,
}

impl<T: Send + 'static> FutureWatcher<T> {
    pub(crate) fn new(future: Future<T>, id: ObserverId, receiver: Receiver<FutureEvent>) -> Self {
        Self {
            future,
            id,
            receiver,
        }
    }

    /// The watched future.
    pub fn future(&self) -> &Future<T> {
        &self.future
    }

    /// Pop the next queued event without blocking.
    pub fn try_next(&self) -> Option<FutureEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Pop the next queued event, waiting up to `timeout` for one to arrive.
    pub fn next_timeout(&self, timeout: Duration) -> Option<FutureEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<FutureEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }

    /// Block until a terminal event (`Finished` or `Canceled`) arrives,
    /// returning every event seen up to and including it.
    pub fn drain_until_terminal(&self) -> Vec<FutureEvent> {
        let mut events = Vec::new();
        for event in self.receiver.iter() {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}

impl<T: Send + 'static> Drop for FutureWatcher<T> {
    fn drop(&mut self) {
        self.future.detach(self.id);
    }
}
