//! Per-provider refresh bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mutable refresh record kept for every known provider.
///
/// Only the refresh path updates it. `consecutive_failures` grows by one per
/// fully exhausted retry sequence and drops to zero on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshState {
    /// When the last refresh sequence finished.
    pub last_refresh_attempt: Option<DateTime<Utc>>,
    /// Exhausted retry sequences since the last success.
    pub consecutive_failures: u32,
    /// A refresh is currently in flight.
    pub is_refreshing: bool,
}

impl RefreshState {
    /// Mark a refresh as started.
    pub fn begin(&mut self) {
        self.is_refreshing = true;
    }

    /// Record a successful refresh at `at`.
    pub fn succeed(&mut self, at: DateTime<Utc>) {
        self.is_refreshing = false;
        self.consecutive_failures = 0;
        self.last_refresh_attempt = Some(at);
    }

    /// Record a retry sequence that ran out of attempts.
    pub fn exhaust(&mut self, at: DateTime<Utc>) {
        self.is_refreshing = false;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_refresh_attempt = Some(at);
    }

    /// Stopped early on a non-retryable failure; the failure counter is left
    /// alone.
    pub fn abandon(&mut self, at: DateTime<Utc>) {
        self.is_refreshing = false;
        self.last_refresh_attempt = Some(at);
    }

    /// Forget all refresh history.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
