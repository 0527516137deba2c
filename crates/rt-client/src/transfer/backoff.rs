//! Exponential backoff between part download attempts

use std::time::Duration;

use rand::Rng;
use rt_core::config::BackoffConfig;

/// Doubling delay with an upper bound and optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    current: Duration,
    max: Duration,
    multiplier: f64,
    /// Fraction of the delay added at random (0.0 to 1.0)
    jitter: f64,
}

impl ExponentialBackoff {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max, config.multiplier, config.jitter)
    }

    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            initial,
            current: initial.min(max),
            max,
            multiplier: multiplier.max(1.0),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay to wait now; advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = self.current.as_secs_f64() * self.multiplier;
        self.current = Duration::from_secs_f64(next.min(self.max.as_secs_f64()));

        if self.jitter == 0.0 {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter;
        delay + Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=spread))
    }

    /// Back to the initial delay
    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_until_capped() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5), 2.0, 0.0);

        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            [1, 2, 4, 5, 5].map(Duration::from_secs).to_vec()
        );
    }

    #[test]
    fn test_reset() {
        let mut backoff = ExponentialBackoff::from_config(&BackoffConfig::default());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_spread() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(60), 2.0, 0.5);
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_secs(2));
        assert!(delay <= Duration::from_secs(3));
    }
}
