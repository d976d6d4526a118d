//! Time sources for simulated devices.
//!
//! Simulated motion is evaluated lazily from the time elapsed since a move was
//! commanded, so every simulator reads time through the [`Clock`] trait instead of
//! calling `Instant::now()` directly. Production code uses [`SystemClock`]; tests
//! drive a [`ManualClock`] forward explicitly so trajectories are reproducible.

use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source, in seconds since an arbitrary origin.
pub trait Clock: Send + Sync + Debug {
    /// Current time in seconds.
    fn now(&self) -> f64;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is the moment of construction.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Convenience constructor for the `Arc<dyn Clock>` the simulators take.
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to.
///
/// Cloning shares the underlying time, so a test can keep one handle and give
/// another to the simulator.
///
/// ```rust,ignore
/// let clock = ManualClock::new();
/// let spectro = Spectrometer::with_clock(SpectrometerConfig::default(), Arc::new(clock.clone()));
/// clock.advance_secs(1.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    seconds: Arc<Mutex<f64>>,
}

impl ManualClock {
    /// Create a clock at t = 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock at the given time.
    pub fn starting_at(seconds: f64) -> Self {
        Self {
            seconds: Arc::new(Mutex::new(seconds)),
        }
    }

    /// Move time forward by `seconds`.
    pub fn advance_secs(&self, seconds: f64) {
        *self.seconds.lock() += seconds;
    }

    /// Move time forward by a [`Duration`].
    pub fn advance(&self, duration: Duration) {
        self.advance_secs(duration.as_secs_f64());
    }

    /// Jump to an absolute time.
    pub fn set(&self, seconds: f64) {
        *self.seconds.lock() = seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.seconds.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a >= 0.0);
    }

    #[test]
    fn test_manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0.0);
        assert_eq!(clock.now(), 0.0);

        clock.advance_secs(1.5);
        assert_eq!(clock.now(), 1.5);

        clock.advance(Duration::from_millis(500));
        assert!((clock.now() - 2.0).abs() < 1e-12);

        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::starting_at(3.0);
        let handle: Arc<dyn Clock> = Arc::new(clock.clone());
        clock.advance_secs(2.0);
        assert_eq!(handle.now(), 5.0);
    }
}
