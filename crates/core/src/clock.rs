// SPDX-License-Identifier: MIT

//! Clock abstraction for testable time handling.
//!
//! Every timer, heartbeat, rotation deadline, and backoff computation in the
//! capture engine goes through a `Clock` rather than calling `Instant::now()`
//! or `Utc::now()` directly, so property and scenario tests can drive time
//! deterministically.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A clock that provides the current time, both monotonic (for timers and
/// backoff) and wall-clock (for record timestamps).
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real system clock.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for deterministic tests: advances only when told to.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockState>>,
}

struct FakeClockState {
    monotonic: Instant,
    wall: DateTime<Utc>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockState {
                monotonic: Instant::now(),
                wall: DateTime::UNIX_EPOCH,
            })),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.inner.lock();
        state.monotonic += duration;
        state.wall += duration;
    }

    pub fn set_utc(&self, wall: DateTime<Utc>) {
        self.inner.lock().wall = wall;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.inner.lock().monotonic
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.inner.lock().wall
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
