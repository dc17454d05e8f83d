// Time source for the control loops

use std::time::{Duration, Instant};

/// Monotonic elapsed-time source plus the settle wait used between commanding
/// a drive and sampling it again
pub trait Clock {
    /// Seconds since an arbitrary fixed origin
    fn now(&self) -> f64;

    /// Block for `duration`
    fn settle(&self, duration: Duration);
}

/// Wall clock backed by `Instant`, settles with a blocking sleep
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn settle(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Hand-driven clock for tests and offline simulation. Settling advances time
/// instead of sleeping.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: std::cell::Cell<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn settle(&self, duration: Duration) {
        self.advance(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_settle_advances() {
        let clock = ManualClock::new();
        clock.settle(Duration::from_millis(5));
        clock.advance(0.02);
        assert!((clock.now() - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let t0 = clock.now();
        clock.settle(Duration::from_millis(1));
        assert!(clock.now() > t0);
    }
}
