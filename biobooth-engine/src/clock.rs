//! Clock abstraction
//!
//! Phase timing and the simulated sources are pure functions of elapsed
//! time; injecting the clock keeps them deterministic under test.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync {
    /// Monotonic instant for elapsed-time arithmetic
    fn now(&self) -> Instant;

    /// Seconds since the Unix epoch, for wire timestamps
    fn epoch_secs(&self) -> f64;
}

/// Real system clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_secs(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// Manually advanced clock for deterministic tests
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Advance the clock by `delta`
    pub fn advance(&self, delta: Duration) {
        *self.offset.lock().unwrap() += delta;
    }

    /// Jump the clock to `elapsed` past its creation
    pub fn set_elapsed(&self, elapsed: Duration) {
        *self.offset.lock().unwrap() = elapsed;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }

    fn epoch_secs(&self) -> f64 {
        self.offset.lock().unwrap().as_secs_f64()
    }
}
