//! Time source implementations.

use std::cell::Cell;
use std::time::Instant;

/// Provider of the two clocks and the tick counter the scheduler's yield
/// instructions are built against.
///
/// Simulated time and real time are independent bases: a yield deferred on
/// one is unaffected by advances of the other. All values are in seconds.
pub trait TimeSource {
    /// Current simulated time.
    fn time(&self) -> f64;

    /// Simulated time elapsed over the last tick.
    fn delta_time(&self) -> f64;

    /// Number of ticks the host has driven so far.
    fn tick_count(&self) -> u64;

    /// Real (wall-clock) time elapsed since the source started.
    fn real_time(&self) -> f64;
}

/// Fallback source installed when no host clock has been pushed.
///
/// Both clocks report real elapsed time since construction. The tick-driven
/// fields (`delta_time`, `tick_count`) are zero: a host that steps a tick
/// loop should install its own source instead.
#[derive(Debug)]
pub struct WallClockTimeSource {
    origin: Instant,
}

impl WallClockTimeSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClockTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClockTimeSource {
    fn time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn delta_time(&self) -> f64 {
        0.0
    }

    fn tick_count(&self) -> u64 {
        0
    }

    fn real_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A source whose clocks only move when told to.
///
/// Intended for hosts that own their tick loop, and for tests that need
/// deterministic time. All fields start at zero.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    time: Cell<f64>,
    delta: Cell<f64>,
    ticks: Cell<u64>,
    real: Cell<f64>,
}

impl ManualTimeSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances simulated time by `delta` seconds and counts one tick.
    pub fn advance(&self, delta: f64) {
        self.time.set(self.time.get() + delta);
        self.delta.set(delta);
        self.ticks.set(self.ticks.get() + 1);
    }

    /// Advances real time by `delta` seconds.
    pub fn advance_real(&self, delta: f64) {
        self.real.set(self.real.get() + delta);
    }

    pub fn set_time(&self, time: f64) {
        self.time.set(time);
    }

    pub fn set_real_time(&self, real: f64) {
        self.real.set(real);
    }

    pub fn set_tick_count(&self, ticks: u64) {
        self.ticks.set(ticks);
    }
}

impl TimeSource for ManualTimeSource {
    fn time(&self) -> f64 {
        self.time.get()
    }

    fn delta_time(&self) -> f64 {
        self.delta.get()
    }

    fn tick_count(&self) -> u64 {
        self.ticks.get()
    }

    fn real_time(&self) -> f64 {
        self.real.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_source_starts_at_zero() {
        let clock = ManualTimeSource::new();
        assert_eq!(clock.time(), 0.0);
        assert_eq!(clock.real_time(), 0.0);
        assert_eq!(clock.tick_count(), 0);
    }

    #[test]
    fn advance_moves_sim_time_and_tick_count_only() {
        let clock = ManualTimeSource::new();
        clock.advance(0.25);
        clock.advance(0.5);
        assert_eq!(clock.time(), 0.75);
        assert_eq!(clock.delta_time(), 0.5);
        assert_eq!(clock.tick_count(), 2);
        assert_eq!(clock.real_time(), 0.0);
    }

    #[test]
    fn real_time_is_independent_of_sim_time() {
        let clock = ManualTimeSource::new();
        clock.advance_real(3.0);
        assert_eq!(clock.real_time(), 3.0);
        assert_eq!(clock.time(), 0.0);
    }

    #[test]
    fn wall_clock_reports_matching_bases() {
        let clock = WallClockTimeSource::new();
        assert!(clock.time() >= 0.0);
        assert_eq!(clock.delta_time(), 0.0);
        assert_eq!(clock.tick_count(), 0);
    }
}
