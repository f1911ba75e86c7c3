//! Exponential backoff between engine relaunches
//!
//! A crashing engine is relaunched after `initial_delay`, then after
//! progressively longer delays capped at `max_delay`. Jitter spreads the
//! relaunches of engines that crash on the same tick. Jitter is drawn from a
//! seeded generator, so a run's restart timing is reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Configuration for exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first relaunch
    pub initial_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Maximum number of delays handed out (None = unlimited)
    pub max_retries: Option<usize>,
    /// Randomization applied to each delay (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_retries: None,
            jitter_factor: 0.1,
        }
    }
}

impl BackoffConfig {
    /// A multiplier below 1.0, NaN or infinite never yields a usable schedule
    pub fn multiplier_is_valid(multiplier: f64) -> bool {
        multiplier.is_finite() && multiplier >= 1.0
    }

    /// Fixed delay, no growth and no jitter
    pub fn constant(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            max_retries: None,
            jitter_factor: 0.0,
        }
    }
}

/// Exponential backoff state machine
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current_attempt: usize,
    current_delay: Duration,
    rng: StdRng,
}

impl ExponentialBackoff {
    pub fn with_config(config: BackoffConfig) -> Self {
        Self::with_seed(config, 0)
    }

    /// Backoff whose jitter is drawn from `StdRng::seed_from_u64(seed)`
    pub fn with_seed(config: BackoffConfig, seed: u64) -> Self {
        Self {
            current_delay: config.initial_delay,
            current_attempt: 0,
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    /// Next delay, advancing the state
    ///
    /// Returns None once `max_retries` delays have been handed out.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }

        let delay = self.with_jitter(self.current_delay).min(self.config.max_delay);

        self.current_attempt += 1;
        self.current_delay = self.scaled(self.current_delay, self.config.multiplier);

        Some(delay)
    }

    fn with_jitter(&mut self, delay: Duration) -> Duration {
        if self.config.jitter_factor == 0.0 {
            return delay;
        }

        let jitter = self.rng.gen::<f64>() * self.config.jitter_factor;
        let factor = 1.0 + (jitter - self.config.jitter_factor / 2.0);
        self.scaled(delay, factor)
    }

    /// `delay * factor`, capped at `max_delay`; unrepresentable results cap too
    fn scaled(&self, delay: Duration, factor: f64) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
            .map_or(self.config.max_delay, |d| d.min(self.config.max_delay))
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
        self.current_delay = self.config.initial_delay;
    }

    #[inline(always)]
    pub fn attempt_number(&self) -> usize {
        self.current_attempt
    }

    pub fn can_retry(&self) -> bool {
        match self.config.max_retries {
            Some(max) => self.current_attempt < max,
            None => true,
        }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(initial_ms: u64, max_ms: u64) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            max_retries: None,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut backoff = ExponentialBackoff::with_config(no_jitter(10, 50));
        let delays: Vec<u128> = (0..5)
            .map(|_| backoff.next_delay().unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 50, 50]);
        assert_eq!(backoff.attempt_number(), 5);
    }

    #[test]
    fn test_backoff_max_retries() {
        let config = BackoffConfig {
            max_retries: Some(2),
            ..no_jitter(1, 10)
        };
        let mut backoff = ExponentialBackoff::with_config(config);
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert!(!backoff.can_retry());
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = ExponentialBackoff::with_config(no_jitter(10, 1000));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt_number(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_backoff_jitter_stays_in_band() {
        let config = BackoffConfig {
            jitter_factor: 0.2,
            ..no_jitter(100, 10_000)
        };
        for _ in 0..50 {
            let mut backoff = ExponentialBackoff::with_config(config.clone());
            let delay = backoff.next_delay().unwrap().as_secs_f64();
            assert!((0.089..=0.111).contains(&delay), "delay {delay} outside jitter band");
        }
    }

    #[test]
    fn test_same_seed_same_jitter() {
        let config = BackoffConfig {
            jitter_factor: 0.5,
            ..no_jitter(100, 10_000)
        };
        let delays = |seed| {
            let mut backoff = ExponentialBackoff::with_seed(config.clone(), seed);
            (0..5).map(|_| backoff.next_delay().unwrap()).collect::<Vec<_>>()
        };
        assert_eq!(delays(7), delays(7));
        assert_ne!(delays(7), delays(8));
    }

    #[test]
    fn test_out_of_range_multiplier_caps_instead_of_panicking() {
        for multiplier in [-2.0, f64::NAN, f64::INFINITY, 1e300] {
            let config = BackoffConfig {
                multiplier,
                ..no_jitter(10, 1000)
            };
            let mut backoff = ExponentialBackoff::with_config(config);
            assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
            assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1000)));
        }
        assert!(!BackoffConfig::multiplier_is_valid(0.5));
        assert!(!BackoffConfig::multiplier_is_valid(f64::NAN));
        assert!(BackoffConfig::multiplier_is_valid(1.0));
    }

    #[test]
    fn test_constant_backoff() {
        let mut backoff = ExponentialBackoff::with_config(BackoffConfig::constant(
            Duration::from_millis(5),
        ));
        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), Some(Duration::from_millis(5)));
        }
    }
}
