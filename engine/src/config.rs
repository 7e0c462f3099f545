//! Configuration for the sync engine.

use backoff::ExponentialBackoff;
use std::time::Duration;

/// Default quiet period before local changes are pushed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Configuration for a [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last local change before pushing.
    pub debounce: Duration,
    /// Retry behavior for pushes that failed without a conflict.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with the default debounce and retry policy.
    pub fn new() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the debounce interval.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff for failed pushes.
///
/// A disabled policy leaves retries to the next local mutation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Whether failed pushes are re-armed automatically.
    pub enabled: bool,
    /// Maximum number of automatic retries after a failure.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound on any single delay.
    pub max_interval: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.0 disables jitter).
    pub randomization_factor: f64,
}

impl RetryConfig {
    /// Creates an enabled retry policy with `max_attempts` retries.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            enabled: true,
            max_attempts,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            multiplier: 2.0,
            randomization_factor: 0.25,
        }
    }

    /// Creates a policy that never retries on its own.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 0,
            ..Self::new(0)
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter factor.
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor;
        self
    }

    /// Builds the backoff schedule for one failure streak.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            randomization_factor: self.randomization_factor,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            // Attempts are bounded by `max_attempts`, not wall-clock time.
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoff::backoff::Backoff;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_debounce(Duration::from_millis(500))
            .with_retry(RetryConfig::disabled());

        assert_eq!(config.debounce, Duration::from_millis(500));
        assert!(!config.retry.enabled);
    }

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce, Duration::from_secs(2));
        assert!(config.retry.enabled);
        assert_eq!(config.retry.max_attempts, 8);
    }

    #[test]
    fn backoff_without_jitter_doubles() {
        let retry = RetryConfig::new(5)
            .with_initial_interval(Duration::from_millis(100))
            .with_randomization_factor(0.0);
        let mut backoff = retry.backoff();

        for expected in [100, 200, 400] {
            let delay = backoff.next_backoff().unwrap();
            let expected = Duration::from_millis(expected);
            assert!(delay >= expected && delay < expected + Duration::from_micros(1));
        }
    }

    #[test]
    fn backoff_respects_max_interval() {
        let retry = RetryConfig::new(10)
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(5))
            .with_multiplier(10.0)
            .with_randomization_factor(0.0);
        let mut backoff = retry.backoff();

        for _ in 0..5 {
            let delay = backoff.next_backoff().unwrap();
            assert!(delay < Duration::from_secs(5) + Duration::from_micros(1));
        }
    }
}
