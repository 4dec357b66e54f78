//! Clock and timing utilities for stream timestamps.
//!
//! Both Screenmux streams are anchored to a monotonic epoch recorded at
//! pipeline start. This module provides:
//! - The pipeline clock (monotonic milliseconds plus the wall-clock epoch)
//! - Rational stream time bases and rescaling between them
//! - Tick pacing for capture drivers

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A pipeline clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment the pipeline started).
#[derive(Debug, Clone)]
pub struct PipelineClock {
    /// The instant the pipeline started.
    epoch: Instant,

    /// Wall-clock time at epoch (ISO 8601 string).
    epoch_wall: String,
}

impl PipelineClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Milliseconds elapsed since pipeline start.
    pub fn elapsed_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    /// Wall-clock time at pipeline start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// A rational time base: one tick lasts `num / den` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i64,
    pub den: i64,
}

impl TimeBase {
    /// Millisecond time base used by [`PipelineClock`].
    pub const MILLIS: TimeBase = TimeBase { num: 1, den: 1000 };

    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Time base of an audio stream: one tick per sample.
    pub const fn per_sample(sample_rate: u32) -> Self {
        Self {
            num: 1,
            den: sample_rate as i64,
        }
    }

    /// Whether both terms are positive.
    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    /// Rescale `value` from this time base into `to`, rounding to the
    /// nearest tick with halves away from zero.
    pub fn rescale(&self, value: i64, to: TimeBase) -> i64 {
        let numer = value as i128 * self.num as i128 * to.den as i128;
        let denom = self.den as i128 * to.num as i128;
        if denom == 0 {
            return 0;
        }
        let half = denom.abs() / 2;
        let rounded = if (numer >= 0) == (denom > 0) {
            (numer.abs() + half) / denom.abs()
        } else {
            -((numer.abs() + half) / denom.abs())
        };
        rounded as i64
    }
}

impl std::fmt::Display for TimeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Frame rate controller for capture ticks.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last + self.target_interval_ns => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            _ => false,
        }
    }

    /// Nanoseconds until the next tick is due.
    pub fn remaining_ns(&self, current_ns: u64) -> u64 {
        match self.last_tick_ns {
            None => 0,
            Some(last) => (last + self.target_interval_ns).saturating_sub(current_ns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = PipelineClock::start();
        assert!(clock.elapsed_ms() < 1000);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_rescale_millis_to_tenths() {
        let tenths = TimeBase::new(1, 10);
        assert_eq!(TimeBase::MILLIS.rescale(0, tenths), 0);
        assert_eq!(TimeBase::MILLIS.rescale(100, tenths), 1);
        assert_eq!(TimeBase::MILLIS.rescale(149, tenths), 1);
        assert_eq!(TimeBase::MILLIS.rescale(150, tenths), 2);
        assert_eq!(TimeBase::MILLIS.rescale(-150, tenths), -2);
    }

    #[test]
    fn test_rescale_samples_is_identity_in_own_base() {
        let base = TimeBase::per_sample(44_100);
        assert_eq!(base.rescale(1024, base), 1024);
        assert_eq!(base.rescale(44_100, TimeBase::MILLIS), 1000);
    }

    #[test]
    fn test_rescale_large_values_do_not_overflow() {
        let base = TimeBase::per_sample(48_000);
        let hours = 48_000i64 * 3600 * 1000;
        assert_eq!(base.rescale(hours, TimeBase::MILLIS), 3_600_000_000);
    }

    #[test]
    fn test_rate_controller() {
        let mut ctrl = RateController::new(60);
        assert!(ctrl.should_tick(0)); // first tick always fires
        assert!(!ctrl.should_tick(1_000_000)); // 1ms later, too soon
        assert!(ctrl.remaining_ns(1_000_000) > 0);
        assert!(ctrl.should_tick(17_000_000)); // ~17ms later, should fire (60Hz ~ 16.67ms)
    }
}
