//! Exponential backoff between attempts.

use chrono::Duration;

use crate::config::QueueConfig;

/// Retry limits and backoff curve.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_delay_ms,
            config.max_delay_ms,
            config.backoff_multiplier,
        )
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            max_delay_ms,
            backoff_multiplier,
        }
    }

    /// No delay between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, 0, 0, 1.0)
    }

    /// Total attempts a job may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after the given (1-based) failed attempt:
    /// `initial * multiplier^(attempt - 1)`, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if raw.is_finite() {
            raw.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::milliseconds(capped.max(0.0) as i64)
    }
}
