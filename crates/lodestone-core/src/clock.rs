//! Injected time source
//!
//! Persisted timestamps are RFC-3339 UTC; deadlines use the monotonic
//! side so wall-clock adjustments cannot shorten or extend them.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Wall-clock plus monotonic time, injected for testability
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic time elapsed since the clock was created
    fn monotonic(&self) -> Duration;
}

/// System clock backed by `Utc::now` and `Instant`
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Manually advanced clock for tests
pub struct ManualClock {
    now: std::sync::Mutex<(DateTime<Utc>, Duration)>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new((start, Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock lock poisoned");
        guard.0 += chrono::Duration::from_std(by).expect("duration out of range");
        guard.1 += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().expect("clock lock poisoned").0
    }

    fn monotonic(&self) -> Duration {
        self.now.lock().expect("clock lock poisoned").1
    }
}
