//! Interactive connect flow state observed by the shell

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderId;
use crate::errors::AuthFailure;

/// Authorization Code + PKCE flow state.
///
/// `Idle → AuthorizationRequested → AwaitingCallback → Exchanging →
/// Connected`, or `→ Failed` from any non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowStatus {
    Idle,
    AuthorizationRequested,
    AwaitingCallback { authorization_url: String },
    Exchanging,
    Connected,
    Failed { reason: AuthFailure },
}

impl FlowStatus {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Connected | Self::Failed { .. })
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationRequested | Self::AwaitingCallback { .. } | Self::Exchanging
        )
    }
}

/// Structured outcome returned to the shell instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<AuthFailure>,
}

impl ConnectResult {
    #[must_use]
    pub const fn ok() -> Self {
        Self { success: true, error: None, failure: None }
    }

    #[must_use]
    pub fn failed(failure: AuthFailure) -> Self {
        Self { success: false, error: Some(failure.user_message()), failure: Some(failure) }
    }
}

impl FlowStatus {
    /// Result of a terminal state; `None` while the flow is idle or pending.
    #[must_use]
    pub fn outcome(&self) -> Option<ConnectResult> {
        match self {
            Self::Connected => Some(ConnectResult::ok()),
            Self::Failed { reason } => Some(ConnectResult::failed(reason.clone())),
            _ => None,
        }
    }
}

/// Connection summary for one provider, without secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub provider: ProviderId,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn disconnected(provider: ProviderId) -> Self {
        Self {
            provider,
            connected: false,
            email: None,
            account_id: None,
            expires_at: None,
            connected_at: None,
        }
    }
}
