//! Runner configuration.

use std::time::Duration;

/// Configuration for the execution runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Budget for a single step invocation. A timeout is treated as a
    /// transient failure, not a permanent one.
    pub step_timeout: Duration,

    /// Attempts per step before a transient failure escalates to
    /// permanent (first attempt included).
    pub max_attempts: u32,

    /// Base delay for exponential backoff between transient retries.
    /// Attempt `n` waits `retry_base_delay * 2^(n-1)`.
    pub retry_base_delay: Duration,

    /// Whether a step recorded as `failed` counts as runnable again.
    /// Off by default: permanent failures go through dead-letter
    /// recovery, not silent re-execution.
    pub retry_failed: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(120),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_failed: false,
        }
    }
}

impl RunnerConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-step timeout budget.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Set the transient-failure attempt bound.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the backoff base delay.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Allow failed steps to be re-run in place.
    pub fn with_retry_failed(mut self, retry: bool) -> Self {
        self.retry_failed = retry;
        self
    }

    /// Backoff delay before the given retry (1-based attempt that just
    /// failed).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}
