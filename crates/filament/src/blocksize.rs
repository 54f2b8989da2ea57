//! Adaptive block-size control for the iteration kernel.
//!
//! A parallel worker claims a block of iterations, runs the user's per-item
//! function over it, publishes the results, and checks control state before
//! claiming the next block. Small blocks give fine-grained cancellation and
//! good load balance but pay per-block dispatch overhead; big blocks amortize
//! the overhead but coarsen everything else. [`BlockSizeController`] walks
//! that trade-off at runtime: it measures the kernel's own bookkeeping time
//! ("control part") against the user-code time ("user part") with rolling
//! medians, and doubles the block size until control overhead falls under 1%
//! of user time or the cap is reached.
//!
//! Each controller is owned by exactly one worker for one run; nothing here
//! is shared or synchronized.

use std::time::Instant;

use crate::error::{FutureError, Result};

/// Number of samples in each rolling median window.
const MEDIAN_WINDOW: usize = 7;

/// Growth stops once control time is under `1/TARGET_RATIO` of user time.
const TARGET_RATIO: u128 = 100;

/// Source of monotonic timestamps for the controller.
///
/// Abstracting the clock keeps the control loop testable and gives a defined
/// degradation path: a clock that fails simply turns adaptivity off, it never
/// stops the kernel.
pub trait MonotonicClock: Send {
    /// Current monotonic timestamp, or [`FutureError::TimerUnavailable`].
    fn now(&mut self) -> Result<Instant>;
}

/// The default clock, backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl MonotonicClock for SystemClock {
    fn now(&mut self) -> Result<Instant> {
        Ok(Instant::now())
    }
}

/// Rolling median over the last [`MEDIAN_WINDOW`] duration samples (nanoseconds).
#[derive(Debug)]
struct RollingMedian {
    samples: [u128; MEDIAN_WINDOW],
    /// Samples currently held (saturates at the window size).
    len: usize,
    /// Ring-buffer write position.
    next: usize,
}

impl RollingMedian {
    fn new() -> Self {
        Self {
            samples: [0; MEDIAN_WINDOW],
            len: 0,
            next: 0,
        }
    }

    fn add(&mut self, sample: u128) {
        self.samples[self.next] = sample;
        self.next = (self.next + 1) % MEDIAN_WINDOW;
        if self.len < MEDIAN_WINDOW {
            self.len += 1;
        }
    }

    /// Statistically valid once at least half a window has accumulated
    /// since the last reset.
    fn is_valid(&self) -> bool {
        self.len >= MEDIAN_WINDOW / 2
    }

    fn median(&self) -> u128 {
        if self.len == 0 {
            return 0;
        }
        let mut sorted = self.samples[..self.len].to_vec();
        sorted.sort_unstable();
        sorted[self.len / 2]
    }

    fn reset(&mut self) {
        self.len = 0;
        self.next = 0;
    }
}

/// Decides how many iterations a worker claims per block.
///
/// The block size starts at 1 and is monotonically non-decreasing within a
/// run, capped at `iteration_count / (pool_size * 2)` (minimum 1) so the
/// range still splits into enough blocks to keep every worker busy.
///
/// Call [`time_before_user`](Self::time_before_user) right before running the
/// user code for a block and [`time_after_user`](Self::time_after_user) right
/// after it; the gap between an `after` and the next `before` is the control
/// part. Once both medians are valid, the controller either leaves the block
/// size alone (control overhead already under 1% of user time) or doubles it
/// and resets both medians so the next comparison reflects the new block
/// size rather than stale history.
pub struct BlockSizeController<C: MonotonicClock = SystemClock> {
    clock: C,
    /// Cleared on the first clock failure; the controller then degrades to a
    /// fixed block size.
    adaptive: bool,
    block_size: usize,
    max_block_size: usize,
    control_part: RollingMedian,
    user_part: RollingMedian,
    last_mark: Option<Instant>,
}

impl BlockSizeController<SystemClock> {
    /// Controller for a run of `iteration_count` items across `pool_size`
    /// workers, using the system clock.
    pub fn new(iteration_count: usize, pool_size: usize) -> Self {
        Self::with_clock(iteration_count, pool_size, SystemClock)
    }
}

impl<C: MonotonicClock> BlockSizeController<C> {
    /// Controller with a caller-supplied clock.
    pub fn with_clock(iteration_count: usize, pool_size: usize, clock: C) -> Self {
        let pool_size = pool_size.max(1);
        let max_block_size = (iteration_count / (pool_size * 2)).max(1);
        Self {
            clock,
            adaptive: true,
            block_size: 1,
            max_block_size,
            control_part: RollingMedian::new(),
            user_part: RollingMedian::new(),
            last_mark: None,
        }
    }

    /// Current block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Upper bound the block size converges towards.
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Whether growth has converged; timing becomes a no-op once it has.
    pub fn block_size_maxed(&self) -> bool {
        self.block_size >= self.max_block_size
    }

    /// Mark the start of user code for the next block. The elapsed time
    /// since the previous mark is accounted to the control part.
    pub fn time_before_user(&mut self) {
        if self.block_size_maxed() || !self.adaptive {
            return;
        }
        let Some(now) = self.mark() else { return };
        if let Some(previous) = self.last_mark.replace(now) {
            self.control_part
                .add(now.duration_since(previous).as_nanos());
        }
    }

    /// Mark the end of user code for the current block, account the elapsed
    /// time to the user part, and grow the block size if the control
    /// overhead is not yet negligible.
    pub fn time_after_user(&mut self) {
        if self.block_size_maxed() || !self.adaptive {
            return;
        }
        let Some(now) = self.mark() else { return };
        if let Some(previous) = self.last_mark.replace(now) {
            self.user_part.add(now.duration_since(previous).as_nanos());
        }
        if !self.control_part.is_valid() || !self.user_part.is_valid() {
            return;
        }
        if self.control_part.median() * TARGET_RATIO < self.user_part.median() {
            // Control overhead is already under 1% of user time.
            return;
        }
        self.block_size = (self.block_size * 2).min(self.max_block_size);
        tracing::trace!(
            target: "filament::blocksize",
            block_size = self.block_size,
            max_block_size = self.max_block_size,
            "block size grown"
        );
        // Stale medians describe the old block size.
        self.control_part.reset();
        self.user_part.reset();
    }

    fn mark(&mut self) -> Option<Instant> {
        match self.clock.now() {
            Ok(now) => Some(now),
            Err(_) => {
                self.adaptive = false;
                self.last_mark = None;
                tracing::warn!(
                    target: "filament::blocksize",
                    block_size = self.block_size,
                    "monotonic clock unavailable; block size adaptation disabled"
                );
                None
            }
        }
    }
}

impl<C: MonotonicClock> std::fmt::Debug for BlockSizeController<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSizeController")
            .field("block_size", &self.block_size)
            .field("max_block_size", &self.max_block_size)
            .field("adaptive", &self.adaptive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Clock that alternates scripted control/user deltas: every odd call
    /// marks the start of user code, every even call the end of it.
    struct StepClock {
        current: Instant,
        control_step: Duration,
        user_step: Duration,
        calls: usize,
    }

    impl StepClock {
        fn new(control_step: Duration, user_step: Duration) -> Self {
            Self {
                current: Instant::now(),
                control_step,
                user_step,
                calls: 0,
            }
        }
    }

    impl MonotonicClock for StepClock {
        fn now(&mut self) -> crate::Result<Instant> {
            self.calls += 1;
            // Call 1 is the first before-user mark; no time has passed yet.
            if self.calls > 1 {
                let step = if self.calls.is_multiple_of(2) {
                    self.user_step
                } else {
                    self.control_step
                };
                self.current += step;
            }
            Ok(self.current)
        }
    }

    struct BrokenClock;

    impl MonotonicClock for BrokenClock {
        fn now(&mut self) -> crate::Result<Instant> {
            Err(FutureError::TimerUnavailable)
        }
    }

    #[test]
    fn test_max_block_size_formula() {
        assert_eq!(BlockSizeController::new(1000, 4).max_block_size(), 125);
        assert_eq!(BlockSizeController::new(16, 2).max_block_size(), 4);
        // iteration_count < pool_size * 2 clamps to 1.
        assert_eq!(BlockSizeController::new(4, 4).max_block_size(), 1);
        assert_eq!(BlockSizeController::new(0, 1).max_block_size(), 1);
        // A zero pool is treated as one worker.
        assert_eq!(BlockSizeController::new(100, 0).max_block_size(), 50);
    }

    #[test]
    fn test_starts_at_one() {
        let controller = BlockSizeController::new(1000, 4);
        assert_eq!(controller.block_size(), 1);
        assert!(!controller.block_size_maxed());
    }

    #[test]
    fn test_grows_when_overhead_dominates_and_caps_at_max() {
        // Control and user steps equal: control is 100x too expensive, so the
        // block size must double whenever both medians are valid.
        let clock = StepClock::new(Duration::from_micros(10), Duration::from_micros(10));
        let mut controller = BlockSizeController::with_clock(1000, 4, clock);

        let mut sizes = vec![controller.block_size()];
        for _ in 0..200 {
            controller.time_before_user();
            controller.time_after_user();
            if *sizes.last().unwrap() != controller.block_size() {
                sizes.push(controller.block_size());
            }
            assert!(controller.block_size() <= controller.max_block_size());
        }

        // Doubling sequence 1 -> 2 -> 4 -> ... capped at 125.
        assert_eq!(sizes, vec![1, 2, 4, 8, 16, 32, 64, 125]);
        assert!(controller.block_size_maxed());
    }

    #[test]
    fn test_stays_put_when_control_is_cheap() {
        // Control at 0.01% of user time: already efficient at block size 1.
        let clock = StepClock::new(Duration::from_nanos(100), Duration::from_millis(1));
        let mut controller = BlockSizeController::with_clock(1000, 4, clock);

        for _ in 0..100 {
            controller.time_before_user();
            controller.time_after_user();
        }
        assert_eq!(controller.block_size(), 1);
    }

    #[test]
    fn test_needs_valid_medians_before_growing() {
        let clock = StepClock::new(Duration::from_micros(10), Duration::from_micros(10));
        let mut controller = BlockSizeController::with_clock(1000, 4, clock);

        // The control median needs MEDIAN_WINDOW / 2 samples, and the first
        // before-user call contributes none. No growth before that.
        for _ in 0..MEDIAN_WINDOW / 2 {
            controller.time_before_user();
            controller.time_after_user();
            assert_eq!(controller.block_size(), 1);
        }
        controller.time_before_user();
        controller.time_after_user();
        assert_eq!(controller.block_size(), 2);
    }

    #[test]
    fn test_broken_clock_degrades_to_fixed_block_size() {
        let mut controller = BlockSizeController::with_clock(1000, 4, BrokenClock);
        for _ in 0..100 {
            controller.time_before_user();
            controller.time_after_user();
        }
        // Forward progress at block size 1, just without adaptivity.
        assert_eq!(controller.block_size(), 1);
    }

    #[test]
    fn test_timing_noop_once_maxed() {
        // max_block_size == 1, so the controller is born converged and the
        // timing calls must short-circuit without touching the clock.
        let clock = StepClock::new(Duration::ZERO, Duration::ZERO);
        let mut controller = BlockSizeController::with_clock(4, 4, clock);
        assert!(controller.block_size_maxed());
        controller.time_before_user();
        controller.time_after_user();
        assert_eq!(controller.clock.calls, 0);
    }

    #[test]
    fn test_rolling_median() {
        let mut median = RollingMedian::new();
        assert!(!median.is_valid());
        median.add(5);
        median.add(1);
        median.add(9);
        assert!(median.is_valid());
        assert_eq!(median.median(), 5);

        // Window slides: old samples fall out after MEDIAN_WINDOW more adds.
        for _ in 0..MEDIAN_WINDOW {
            median.add(100);
        }
        assert_eq!(median.median(), 100);

        median.reset();
        assert!(!median.is_valid());
        assert_eq!(median.median(), 0);
    }
}
