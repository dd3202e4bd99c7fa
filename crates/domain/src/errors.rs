//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Tabula
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TabulaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Tabula operations
pub type Result<T> = std::result::Result<T, TabulaError>;

/// Failure taxonomy of the credential subsystem.
///
/// None of these ever escape a public operation as a panic or raw I/O error:
/// callers see them as `None`, `false`, or inside a [`crate::ConnectResult`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AuthFailure {
    /// No key or token stored; recoverable by configuring or connecting.
    #[error("no credential stored")]
    NoCredential,

    /// All refresh attempts failed; treat as `NoCredential` for now.
    #[error("token refresh exhausted after {attempts} attempts")]
    RefreshExhausted { attempts: u32 },

    /// Callback `state` did not match the pending authorization.
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// Callback carried neither an error nor an authorization code.
    #[error("authorization code missing from callback")]
    MissingAuthorizationCode,

    /// Authorization server redirected back with an `error` parameter.
    #[error("authorization server returned {error}{}", .description.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    OAuthProviderError { error: String, description: Option<String> },

    /// Refresh token rejected by the server; credentials were cleared.
    #[error("refresh token rejected (HTTP {status}); reconnect required")]
    RefreshTokenInvalid { status: u16 },

    /// OS-backed encryption is not available; nothing was persisted.
    #[error("credential encryption unavailable: {0}")]
    EncryptionUnavailable(String),

    /// The loopback callback port could not be bound.
    #[error("callback listener unavailable on port {port}: {reason}")]
    ListenerUnavailable { port: u16, reason: String },

    /// No callback arrived before the flow deadline.
    #[error("timed out waiting for the authorization callback")]
    CallbackTimeout,

    /// Authorization code exchange failed.
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    /// The flow was superseded by a newer attempt or a disconnect.
    #[error("authorization flow cancelled")]
    Cancelled,
}

impl AuthFailure {
    /// Message suitable for showing to the user in the shell.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NoCredential | Self::RefreshExhausted { .. } => {
                "Not connected. Connect the provider or add an API key.".to_string()
            }
            Self::StateMismatch => {
                "Sign-in was rejected for security reasons. Please try again.".to_string()
            }
            Self::RefreshTokenInvalid { .. } => {
                "Your session has ended. Please sign in again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<AuthFailure> for TabulaError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::StateMismatch | AuthFailure::EncryptionUnavailable(_) => {
                Self::Security(failure.to_string())
            }
            AuthFailure::ListenerUnavailable { .. } | AuthFailure::CallbackTimeout => {
                Self::Network(failure.to_string())
            }
            other => Self::Auth(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for domain::errors.
    use super::*;

    /// Validates `AuthFailure::OAuthProviderError` formatting with and
    /// without a description.
    #[test]
    fn test_provider_error_display() {
        let with = AuthFailure::OAuthProviderError {
            error: "access_denied".to_string(),
            description: Some("user cancelled".to_string()),
        };
        assert_eq!(with.to_string(), "authorization server returned access_denied: user cancelled");

        let without =
            AuthFailure::OAuthProviderError { error: "access_denied".to_string(), description: None };
        assert_eq!(without.to_string(), "authorization server returned access_denied");
    }

    /// Validates the mapping of security-relevant failures into
    /// `TabulaError::Security`.
    #[test]
    fn test_security_failures_map_to_security_error() {
        assert!(matches!(TabulaError::from(AuthFailure::StateMismatch), TabulaError::Security(_)));
        assert!(matches!(
            TabulaError::from(AuthFailure::RefreshTokenInvalid { status: 400 }),
            TabulaError::Auth(_)
        ));
    }

    /// Validates that failures serialize with a stable tag for the UI bridge.
    #[test]
    fn test_failure_serialization_tag() {
        let json = serde_json::to_value(AuthFailure::CallbackTimeout).unwrap();
        assert_eq!(json["kind"], "callback_timeout");
    }
}
