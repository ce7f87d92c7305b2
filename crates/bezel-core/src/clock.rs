//! Time source
//!
//! Sleeps, elapsed-time measurements and "now" all go through a [`Clock`]
//! so the retry backoff, the sync budget and the latency probes can be
//! driven by a fake clock in tests.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Source of monotonic time, wall-clock time and sleeping
pub trait Clock: Send + Sync {
    /// Monotonic instant used for durations
    fn now(&self) -> Instant;

    /// Wall-clock time
    fn utc_now(&self) -> DateTime<Utc>;

    /// Block the current thread
    fn sleep(&self, duration: Duration);
}

/// The real clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
