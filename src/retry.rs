//! Retry with exponential backoff and jitter for provider calls.

use crate::provider::ProviderError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::warn;

/// HTTP statuses retried by default: rate limiting and transient server errors.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 4] = [429, 500, 503, 504];

/// Configuration for automatic retry of transient provider errors.
///
/// Defaults: 5 attempts in total, 1s initial delay, 7x backoff, 60s max delay,
/// retrying on 429/500/503/504 and on network failures.
/// Use `RetryPolicy::none()` to disable retries entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first call (1 = no retries).
    pub max_attempts: u32,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_base: f64,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// HTTP statuses that count as transient.
    pub retryable_status_codes: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: 7.0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// No retries: fail immediately on any error.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff_base(mut self, base: f64) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Delay before retry number `retry` (1-indexed), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ms = self.initial_delay.as_millis() as f64 * self.backoff_base.powi(exponent);
        let capped = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Calculate the delay for a given retry (1-indexed).
    /// Uses exponential backoff with ±20% jitter.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay(retry).as_millis() as f64;

        // Jitter: ±20% (multiply by 0.8–1.2)
        let jitter = 0.8 + rand::random::<f64>() * 0.4;
        Duration::from_millis((base_ms * jitter) as u64)
    }

    /// Whether this error is safe to retry under this policy.
    ///
    /// Retryable: configured HTTP statuses and network/transport failures.
    /// Not retryable: auth errors, other API errors, cancellation.
    pub fn should_retry(&self, error: &ProviderError) -> bool {
        match error {
            ProviderError::Status { status, .. } => self.retryable_status_codes.contains(status),
            ProviderError::Network(_) => true,
            _ => false,
        }
    }
}

/// Log a retry attempt.
pub(crate) fn log_retry(attempt: u32, max: u32, delay: &Duration, error: &ProviderError) {
    warn!(
        "Provider error (attempt {}/{}), retrying in {:.1}s: {}",
        attempt,
        max,
        delay.as_secs_f64(),
        error
    );
}
