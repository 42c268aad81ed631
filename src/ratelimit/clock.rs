//! Wall-clock sources.
//!
//! Window scores are fractional seconds since the Unix epoch so that every
//! process sharing a store agrees on what "now" means.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

/// Supplies the current time as fractional epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Reads the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same time value.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<f64>>,
}

impl ManualClock {
    /// Clock stopped at `start` epoch seconds.
    pub fn new(start: f64) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.current.lock() += by.as_secs_f64();
    }

    /// Jump to `to` epoch seconds, backwards included.
    pub fn set(&self, to: f64) {
        *self.current.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.current.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_epoch_seconds() {
        let now = SystemClock.now();
        // Some time after 2020-01-01.
        assert!(now > 1_577_836_800.0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100.0);
        let shared = clock.clone();

        shared.advance(Duration::from_millis(1500));
        assert_eq!(clock.now(), 101.5);

        clock.set(5.0);
        assert_eq!(shared.now(), 5.0);
    }
}
