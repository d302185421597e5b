// Retry strategy implementation with capped exponential backoff and optional jitter
// Shared by the listing and buffered download paths.

use crate::errors::ErrorClass;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Default number of attempts (first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Outcome of a retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Retry strategy trait for calculating retry delays
///
/// Attempts are 1-based: `attempt` is the number of the attempt that just failed.
pub trait RetryStrategy: Send + Sync {
    /// Calculate the delay before the attempt following `attempt`
    /// Returns None if no attempts remain
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Get the maximum number of attempts
    fn max_attempts(&self) -> u32 {
        DEFAULT_MAX_ATTEMPTS
    }

    /// Check if another attempt is allowed after `attempt`
    fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    /// Pure decision function: no I/O, no sleeping
    fn decide(&self, class: ErrorClass, attempt: u32) -> RetryDecision {
        if class == ErrorClass::Permanent || !self.should_retry(attempt) {
            return RetryDecision::GiveUp;
        }
        match self.next_delay(attempt) {
            Some(delay) => RetryDecision::RetryAfter(delay),
            None => RetryDecision::GiveUp,
        }
    }
}

/// Capped exponential backoff: `min(base × 2^(n−1), cap)` plus optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Base delay in milliseconds (default: 1000)
    base_delay_ms: u64,
    /// Maximum delay in milliseconds
    max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0, default: 0.0)
    jitter_factor: f64,
    /// Attempts including the first one
    max_attempts: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::download()
    }
}

impl ExponentialBackoff {
    /// Policy for directory enumeration: 3 attempts, 1s base, 3s cap
    pub fn listing() -> Self {
        Self::with_config(DEFAULT_MAX_ATTEMPTS, 1000, 3000, 0.0)
    }

    /// Policy for buffered downloads: 3 attempts, 1s base, 5s cap
    pub fn download() -> Self {
        Self::with_config(DEFAULT_MAX_ATTEMPTS, 1000, 5000, 0.0)
    }

    /// Create a new exponential backoff strategy with custom values
    pub fn with_config(
        max_attempts: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
        jitter_factor: f64,
    ) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Calculate capped exponential delay without jitter
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        self.base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_ms)
    }

    /// Add random jitter to prevent thundering herd
    fn add_jitter_ms(&self, base_delay_ms: u64) -> u64 {
        if self.jitter_factor == 0.0 {
            return base_delay_ms;
        }

        let jitter_range_ms = (base_delay_ms as f64 * self.jitter_factor) as u64;
        if jitter_range_ms == 0 {
            return base_delay_ms;
        }

        base_delay_ms + rand::thread_rng().gen_range(0..=jitter_range_ms)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }

        let delay_ms = self.add_jitter_ms(self.base_delay_ms(attempt));
        Some(Duration::from_millis(delay_ms))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Fixed delay retry strategy (for testing or simple cases)
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: max_attempts.max(1),
        }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        Some(self.delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Run `op` until it succeeds, fails permanently, or the strategy gives up.
///
/// `classify` is consulted once per failure; the last error is returned unchanged.
pub async fn retry_with_backoff<T, E, S, C, F, Fut>(
    strategy: &S,
    operation: &'static str,
    classify: C,
    mut op: F,
) -> Result<T, E>
where
    S: RetryStrategy + ?Sized,
    C: Fn(&E) -> ErrorClass,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = strategy.max_attempts();
    let mut attempt = 1;

    loop {
        info!(operation, attempt, max_attempts, "Starting attempt");

        let error = match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        match strategy.decide(classify(&error), attempt) {
            RetryDecision::RetryAfter(delay) => {
                warn!(
                    operation,
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying after backoff"
                );
                crate::telemetry::record_retry(operation);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            RetryDecision::GiveUp => {
                warn!(operation, attempt, error = %error, "Giving up");
                return Err(error);
            }
        }
    }
}
