//! Worker thread pool backing the iteration kernel.
//!
//! A thin wrapper over rayon's work-stealing pool: a lazily initialized
//! global instance sized to the CPU count, plus explicit construction for
//! callers that want their own pool (tests, embedders with their own sizing
//! policy). The kernel only needs fire-and-forget spawning; result delivery,
//! cancellation, and progress all travel through the future itself.
//!
//! # Example
//!
//! ```no_run
//! use filament::{ThreadPool, ThreadPoolConfig};
//!
//! let pool = ThreadPool::new(ThreadPoolConfig::with_threads(4)).unwrap();
//! pool.spawn(|| {
//!     // Background work.
//! });
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use rayon::{ThreadPool as RayonThreadPool, ThreadPoolBuilder};

use crate::error::{FutureError, Result};

/// Global thread pool instance.
static GLOBAL_POOL: OnceLock<ThreadPool> = OnceLock::new();

/// Configuration for creating a thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads. `None` means use the number of CPU cores.
    pub num_threads: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name: String,
    /// Stack size for worker threads in bytes.
    pub stack_size: Option<usize>,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name: "filament-worker".to_string(),
            stack_size: None,
        }
    }
}

impl ThreadPoolConfig {
    /// Create a new configuration with a custom thread count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            ..Default::default()
        }
    }
}

/// A pool of worker threads for background execution.
pub struct ThreadPool {
    pool: RayonThreadPool,
    active_tasks: Arc<AtomicUsize>,
}

impl ThreadPool {
    /// Get the global thread pool instance.
    ///
    /// Lazily initialized with default settings (one thread per CPU core).
    pub fn global() -> &'static ThreadPool {
        GLOBAL_POOL.get_or_init(|| {
            ThreadPool::new(ThreadPoolConfig::default())
                .expect("Failed to create global thread pool")
        })
    }

    /// Initialize the global thread pool with custom configuration.
    ///
    /// Must be called before the first use of [`global`](Self::global);
    /// fails with [`FutureError::PoolAlreadyInitialized`] otherwise.
    pub fn init_global(config: ThreadPoolConfig) -> Result<&'static ThreadPool> {
        let pool = ThreadPool::new(config)?;
        GLOBAL_POOL
            .set(pool)
            .map_err(|_| FutureError::PoolAlreadyInitialized)?;
        Ok(GLOBAL_POOL.get().expect("pool was just set"))
    }

    /// Create a new thread pool with the given configuration.
    pub fn new(config: ThreadPoolConfig) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new()
            .thread_name(move |index| format!("{}-{}", config.thread_name, index));

        if let Some(num_threads) = config.num_threads {
            builder = builder.num_threads(num_threads);
        }
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let pool = builder
            .build()
            .map_err(|e| FutureError::PoolCreation(e.to_string()))?;

        Ok(Self {
            pool,
            active_tasks: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Number of currently running tasks.
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }

    /// Spawn a fire-and-forget task on the pool.
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        let active_tasks = self.active_tasks.clone();
        self.pool.spawn(move || {
            task();
            active_tasks.fetch_sub(1, Ordering::AcqRel);
        });
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("num_threads", &self.num_threads())
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}
