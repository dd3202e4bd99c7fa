//! Backoff and jitter for token refresh retries
//!
//! The delay after a failed attempt is
//! `base * 2^attempt + min(consecutive_failures, cap) * penalty`, then
//! perturbed by a uniform jitter of `±jitter_ratio` of itself.

use std::time::Duration;

use rand::Rng;
use tabula_domain::RefreshPolicy;

/// Exponential backoff with a failure-history penalty
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshBackoff {
    base: Duration,
    penalty: Duration,
    max_penalized_failures: u32,
    jitter_ratio: f64,
}

impl RefreshBackoff {
    /// Backoff parameters taken from the configured refresh policy.
    #[must_use]
    pub fn from_policy(policy: &RefreshPolicy) -> Self {
        Self {
            base: Duration::from_millis(policy.base_backoff_ms),
            penalty: Duration::from_millis(policy.failure_penalty_ms),
            max_penalized_failures: policy.max_penalized_failures,
            jitter_ratio: policy.jitter_ratio,
        }
    }

    /// Delay before jitter for the given zero-based failed attempt.
    #[must_use]
    pub fn base_delay(&self, attempt: u32, consecutive_failures: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let exponential = self.base.saturating_mul(factor);
        let penalized = consecutive_failures.min(self.max_penalized_failures);
        exponential.saturating_add(self.penalty.saturating_mul(penalized))
    }

    /// Jittered delay to wait after the given zero-based failed attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32, consecutive_failures: u32) -> Duration {
        jitter(self.base_delay(attempt, consecutive_failures), self.jitter_ratio)
    }
}

/// Perturb `delay` uniformly within `±ratio` of itself.
#[must_use]
pub fn jitter(delay: Duration, ratio: f64) -> Duration {
    let offset = jitter_offset_ms(delay, ratio);
    let millis = i128::try_from(delay.as_millis()).unwrap_or(i128::MAX) + i128::from(offset);
    Duration::from_millis(u64::try_from(millis.max(0)).unwrap_or(u64::MAX))
}

/// Signed offset in milliseconds drawn uniformly from `±ratio` of `window`.
#[must_use]
pub fn jitter_offset_ms(window: Duration, ratio: f64) -> i64 {
    if ratio <= 0.0 || window.is_zero() {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let spread = (window.as_millis() as f64 * ratio).round() as i64;
    if spread == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(-spread..=spread)
}
