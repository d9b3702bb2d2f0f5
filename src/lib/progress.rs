//! Interval progress logging.

use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::logging::format_count;

/// Thread-safe counter that logs each time it crosses a multiple of its
/// interval.
///
/// ```
/// use bamidx_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Indexed records").with_interval(100);
/// for _ in 0..250 {
///     tracker.add(1); // logs at 100 and 200
/// }
/// tracker.log_final(); // logs "Indexed records 250 (complete)"
/// ```
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: AtomicU64,
}

impl ProgressTracker {
    /// Tracker with a default interval of 1,000,000.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { interval: 1_000_000, message: message.into(), count: AtomicU64::new(0) }
    }

    /// # Panics
    ///
    /// Panics if `interval` is zero.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        assert!(interval > 0, "progress interval must be positive");
        self.interval = interval;
        self
    }

    /// Add `n` to the count, logging every interval boundary crossed.
    pub fn add(&self, n: u64) {
        if n == 0 {
            return;
        }
        let prev = self.count.fetch_add(n, Ordering::Relaxed);
        for i in (prev / self.interval + 1)..=((prev + n) / self.interval) {
            info!("{} {}", self.message, format_count(i * self.interval));
        }
    }

    /// Log the final count unless the last boundary already did.
    pub fn log_final(&self) {
        let count = self.count();
        if count > 0 && !count.is_multiple_of(self.interval) {
            info!("{} {} (complete)", self.message, format_count(count));
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
