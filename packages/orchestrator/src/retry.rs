//! Bounded retry policy with exponential backoff.
//!
//! The orchestrator applies one policy uniformly to every reasoning
//! call: a failed attempt is retried only when the error is transient
//! and the retry budget is not spent, waiting `initial_backoff_ms ×
//! backoff_multiplier^n` (capped at `max_backoff_ms`) before retry `n+1`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry budget and backoff curve (`[run.retry]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Total attempts including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether a failure on zero-based `attempt` should be retried.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32, transient: bool) -> bool {
        transient && attempt < self.max_retries
    }

    /// Delay before the retry that follows zero-based `attempt`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let millis = (self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_backoff_ms as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(format!(
                "run.retry.backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(format!(
                "run.retry.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            ));
        }
        Ok(())
    }
}
