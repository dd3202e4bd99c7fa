//! Seams between the token manager, credential sources and the desktop shell
//!
//! These traits enable dependency injection and testing by abstracting
//! each provider's credential mechanics, the refresh timer owner, and the
//! system browser.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tabula_domain::{AuthFailure, ProviderId, TokenInfo};
use thiserror::Error;

/// Failure of a single refresh attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// Nothing stored to refresh from
    #[error("no credential stored")]
    NoCredential,

    /// Server rejected the refresh token; credentials have been cleared
    #[error("refresh token rejected (HTTP {status})")]
    Rejected { status: u16 },

    /// Network or server failure worth retrying
    #[error("refresh failed: {0}")]
    Transient(String),
}

impl RefreshError {
    /// Only transient failures are retried with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<RefreshError> for AuthFailure {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::NoCredential => Self::NoCredential,
            RefreshError::Rejected { status } => Self::RefreshTokenInvalid { status },
            RefreshError::Transient(reason) => Self::ExchangeFailed(reason),
        }
    }
}

/// Provider-specific access to the current token and its refresh operation
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Provider whose credential this source manages.
    fn provider(&self) -> ProviderId;

    /// Token as currently stored, without refreshing. `None` when absent.
    async fn current(&self) -> Option<TokenInfo>;

    /// Perform one refresh attempt.
    ///
    /// # Errors
    /// [`RefreshError`] describing whether the attempt may be retried.
    async fn refresh(&self) -> Result<TokenInfo, RefreshError>;

    /// Whether the source re-arms its own proactive timer after a successful
    /// refresh (fixed provider cadence) instead of the manager's expiry-based
    /// schedule.
    fn self_scheduling(&self) -> bool {
        false
    }
}

/// Owner of the per-provider proactive refresh timers
pub trait RefreshScheduler: Send + Sync {
    /// Arm a refresh ahead of `expires_at` using the expiry buffer.
    fn schedule_refresh(&self, provider: ProviderId, expires_at: DateTime<Utc>);

    /// Arm a refresh after a fixed delay.
    fn schedule_refresh_in(&self, provider: ProviderId, delay: Duration);

    /// Disarm any pending timer for `provider`.
    fn cancel_refresh(&self, provider: ProviderId);
}

/// Opens authorization URLs in the user's browser
pub trait BrowserOpener: Send + Sync {
    /// # Errors
    /// Any failure to launch the browser; the flow continues regardless.
    fn open(&self, url: &str) -> std::io::Result<()>;
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::traits.
    use super::*;

    /// Validates that only transient errors are retryable.
    #[test]
    fn test_retry_classification() {
        assert!(RefreshError::Transient("503".into()).is_retryable());
        assert!(!RefreshError::NoCredential.is_retryable());
        assert!(!RefreshError::Rejected { status: 400 }.is_retryable());
    }

    /// Validates conversion into the shared failure taxonomy.
    #[test]
    fn test_into_auth_failure() {
        assert_eq!(
            AuthFailure::from(RefreshError::Rejected { status: 401 }),
            AuthFailure::RefreshTokenInvalid { status: 401 }
        );
        assert_eq!(AuthFailure::from(RefreshError::NoCredential), AuthFailure::NoCredential);
    }
}
