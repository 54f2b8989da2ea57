//! Error types for filament.

use thiserror::Error;

/// Errors that can occur while driving a future or the iteration kernel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FutureError {
    /// A mutation was attempted on a future that already reached a terminal
    /// state. The offending call is rejected atomically; the shared state is
    /// left untouched.
    #[error("future is already finished; no further mutation is accepted")]
    InvalidState,

    /// Two producers reported a result for the same index. Producers must
    /// partition the index space disjointly, so this is a kernel bug and is
    /// fatal to the affected future. The store is left unchanged.
    #[error("result index {index} is already populated")]
    DuplicateIndex {
        /// The index that was reported twice.
        index: usize,
    },

    /// The monotonic clock is unavailable. Block-size adaptation degrades to
    /// a fixed block size; forward progress is unaffected.
    #[error("monotonic clock unavailable")]
    TimerUnavailable,

    /// Failed to build the worker thread pool.
    #[error("failed to create thread pool: {0}")]
    PoolCreation(String),

    /// The global thread pool has already been initialized.
    #[error("global thread pool has already been initialized")]
    PoolAlreadyInitialized,
}

/// A specialized Result type for filament operations.
pub type Result<T> = std::result::Result<T, FutureError>;
