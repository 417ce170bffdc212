//! Producer pacing from smoothed worker timings.
//!
//! The window starts zero-filled and the average is taken over every
//! slot, so the delay ramps up from zero during warm-up. The delay is
//! `average / workers`: it assumes the pool runs fully in parallel
//! without contention, which is a heuristic rather than an optimum.

use std::time::Duration;

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use tracing::debug;

use crate::wire::TimingSample;

pub const DEFAULT_PACING_WINDOW: usize = 8;

pub struct PacingState {
    window: HeapRb<f64>,
    average: f64,
}

impl PacingState {
    /// `window` is clamped to at least one slot
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        let mut ring = HeapRb::new(window);
        for _ in 0..window {
            ring.push_overwrite(0.0);
        }
        Self {
            window: ring,
            average: 0.0,
        }
    }

    /// Overwrite the oldest slot with `sample`
    pub fn record(&mut self, sample: TimingSample) {
        let secs = sample.as_secs();
        if !secs.is_finite() || secs < 0.0 {
            debug!(secs, "Ignoring invalid timing sample");
            return;
        }
        self.window.push_overwrite(secs);
    }

    /// Mean over the whole window
    pub fn recompute(&mut self) -> f64 {
        let len = self.window.occupied_len();
        self.average = self.window.iter().sum::<f64>() / len as f64;
        self.average
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn window_len(&self) -> usize {
        self.window.occupied_len()
    }

    /// Saturates at `Duration::MAX`
    pub fn delay(&self, num_workers: usize) -> Duration {
        let secs = self.average / num_workers.max(1) as f64;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Default for PacingState {
    fn default() -> Self {
        Self::new(DEFAULT_PACING_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn warm_up_delay_is_zero() {
        let mut pacing = PacingState::default();
        assert_eq!(pacing.window_len(), DEFAULT_PACING_WINDOW);
        assert_eq!(pacing.recompute(), 0.0);
        for workers in [1, 4, 16] {
            assert_eq!(pacing.delay(workers), Duration::ZERO);
        }
    }

    #[test]
    fn constant_samples_converge() {
        let mut pacing = PacingState::default();
        for _ in 0..DEFAULT_PACING_WINDOW {
            pacing.record(TimingSample::from_secs(0.2));
            pacing.recompute();
        }
        assert!(approx(pacing.average(), 0.2));
        let delay = pacing.delay(4).as_secs_f64();
        assert!(approx(delay, 0.05), "delay {delay}");
    }

    #[test]
    fn partial_window_averages_in_zeros() {
        let mut pacing = PacingState::default();
        pacing.record(TimingSample::from_secs(0.8));
        assert!(approx(pacing.recompute(), 0.1));
    }

    #[test]
    fn ramp_smooths_to_mean() {
        let mut pacing = PacingState::default();
        for i in 1..=8 {
            pacing.record(TimingSample::from_secs(i as f64 / 10.0));
            pacing.recompute();
        }
        assert!(approx(pacing.average(), 0.45));
    }

    #[test]
    fn oldest_sample_is_overwritten() {
        let mut pacing = PacingState::new(2);
        for secs in [1.0, 2.0, 3.0] {
            pacing.record(TimingSample::from_secs(secs));
        }
        assert!(approx(pacing.recompute(), 2.5));
        assert_eq!(pacing.window_len(), 2);
    }

    #[test]
    fn invalid_samples_are_skipped() {
        let mut pacing = PacingState::new(1);
        pacing.record(TimingSample::from_secs(0.5));
        pacing.record(TimingSample::from_secs(f64::NAN));
        pacing.record(TimingSample::from_secs(-1.0));
        pacing.record(TimingSample::from_secs(f64::INFINITY));
        assert!(approx(pacing.recompute(), 0.5));
    }

    #[test]
    fn zero_workers_is_treated_as_one() {
        let mut pacing = PacingState::new(1);
        pacing.record(TimingSample::from_secs(0.3));
        pacing.recompute();
        assert_eq!(pacing.delay(0), pacing.delay(1));
    }

    #[test]
    fn huge_average_saturates_delay() {
        let mut pacing = PacingState::new(1);
        pacing.record(TimingSample::from_secs(1e300));
        pacing.recompute();
        assert_eq!(pacing.delay(4), Duration::MAX);
    }
}
