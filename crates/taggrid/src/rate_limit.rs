use std::time::{Duration, Instant};

use crate::StopSignal;

/// Caps a loop at a maximum number of cycles per second.
///
/// Call [`RateLimiter::begin`] at the top of each cycle and
/// [`RateLimiter::pace`] at the bottom. A cycle that overruns its period
/// starts the next one immediately; missed cycles are not made up.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    period: Option<Duration>,
    started: Instant,
}

impl RateLimiter {
    /// A non-positive or non-finite rate disables limiting.
    pub fn new(rate_hz: f64) -> Self {
        Self {
            period: period_for(rate_hz),
            started: Instant::now(),
        }
    }

    pub fn set_rate(&mut self, rate_hz: f64) {
        self.period = period_for(rate_hz);
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn begin(&mut self) {
        self.started = Instant::now();
    }

    /// Time left in the current period.
    pub fn remaining(&self) -> Duration {
        self.period
            .map_or(Duration::ZERO, |p| p.saturating_sub(self.started.elapsed()))
    }

    /// Sleep out the rest of the period. Returns `true` if `stop` was raised.
    pub fn pace(&self, stop: &StopSignal) -> bool {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return stop.is_stopped();
        }
        stop.sleep(remaining)
    }
}

fn period_for(rate_hz: f64) -> Option<Duration> {
    (rate_hz.is_finite() && rate_hz > 0.0).then(|| Duration::from_secs_f64(1.0 / rate_hz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn short_cycles_are_stretched_to_the_period() {
        let stop = StopSignal::new();
        let mut limiter = RateLimiter::new(4.0);
        let t0 = Instant::now();
        limiter.begin();
        thread::sleep(Duration::from_millis(50));
        assert!(!limiter.pace(&stop));
        assert!(t0.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn overrunning_cycle_does_not_sleep() {
        let stop = StopSignal::new();
        let mut limiter = RateLimiter::new(4.0);
        limiter.begin();
        thread::sleep(Duration::from_millis(300));
        let t0 = Instant::now();
        limiter.pace(&stop);
        assert!(t0.elapsed() < Duration::from_millis(50));
        assert_eq!(limiter.remaining(), Duration::ZERO);
    }

    #[test]
    fn zero_rate_means_unlimited() {
        let limiter = RateLimiter::new(0.0);
        assert_eq!(limiter.period(), None);
        assert_eq!(limiter.remaining(), Duration::ZERO);
    }

    #[test]
    fn stop_cuts_the_wait_short() {
        let stop = StopSignal::new();
        stop.stop();
        let mut limiter = RateLimiter::new(0.5);
        limiter.begin();
        let t0 = Instant::now();
        assert!(limiter.pace(&stop));
        assert!(t0.elapsed() < Duration::from_millis(500));
    }
}
