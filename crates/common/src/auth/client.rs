//! OAuth 2.0 client for Authorization Code + PKCE against a public client
//!
//! Handles the three interactions with the authorization server:
//! - Building the browser authorization URL
//! - Exchanging an authorization code (with the PKCE verifier)
//! - Refreshing an access token with a refresh token

use reqwest::Client;
use tabula_domain::OAuthProviderSettings;
use thiserror::Error;
use tracing::debug;

use super::pkce::PkcePair;
use super::types::{OAuthErrorBody, TokenResponse};

/// Error type for OAuth client operations
#[derive(Debug, Error)]
pub enum OAuthClientError {
    /// Transport failure before a response was received
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Token endpoint answered with a non-success status
    #[error("token endpoint returned HTTP {status}{}", .body.as_ref().map(|b| format!(": {b}")).unwrap_or_default())]
    Rejected { status: u16, body: Option<OAuthErrorBody> },

    /// Response body was not a valid token response
    #[error("failed to parse token response: {0}")]
    ParseError(String),

    /// No refresh token available
    #[error("no refresh token available")]
    NoRefreshToken,
}

impl OAuthClientError {
    /// Whether the server rejected the grant itself (400/401), as opposed to
    /// a transient failure.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Rejected { status, .. } if *status == 400 || *status == 401)
    }

    /// HTTP status of a rejected request.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// OAuth 2.0 client with PKCE support
///
/// Implements RFC 6749 (OAuth 2.0) and RFC 7636 (PKCE) for a public client:
/// no client secret is ever sent.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    settings: OAuthProviderSettings,
    http: Client,
}

impl OAuthClient {
    /// Create a new OAuth client
    ///
    /// # Arguments
    /// * `settings` - Endpoints, client id, redirect URI and scopes
    /// * `http` - Shared HTTP client (timeouts and proxy configured by the
    ///   caller)
    #[must_use]
    pub fn new(settings: OAuthProviderSettings, http: Client) -> Self {
        Self { settings, http }
    }

    /// Provider endpoints and client settings.
    #[must_use]
    pub fn settings(&self) -> &OAuthProviderSettings {
        &self.settings
    }

    /// Build the authorization URL for the browser
    ///
    /// # Arguments
    /// * `pkce` - Pair whose challenge is sent (the verifier stays local)
    /// * `state` - CSRF token echoed back on the redirect
    #[must_use]
    pub fn authorization_url(&self, pkce: &PkcePair, state: &str) -> String {
        let mut params = vec![
            ("response_type", "code".to_string()),
            ("client_id", self.settings.client_id.clone()),
            ("redirect_uri", self.settings.redirect_uri.clone()),
            ("scope", self.settings.scope_string()),
            ("code_challenge", pkce.challenge.clone()),
            ("code_challenge_method", pkce.challenge_method().to_string()),
            ("state", state.to_string()),
        ];
        params.extend(
            self.settings.extra_authorize_params.iter().map(|(k, v)| (k.as_str(), v.clone())),
        );

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let separator = if self.settings.authorize_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query_string}", self.settings.authorize_url)
    }

    /// Exchange an authorization code for tokens
    ///
    /// # Arguments
    /// * `code` - Authorization code from the redirect callback
    /// * `verifier` - PKCE verifier of the pending authorization
    ///
    /// # Errors
    /// Returns error if the request fails, the server rejects the code, or
    /// the response cannot be parsed
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<TokenResponse, OAuthClientError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("code_verifier", verifier),
        ];
        self.post_token(&form).await
    }

    /// Refresh an access token
    ///
    /// # Arguments
    /// * `refresh_token` - Refresh token from a previous grant
    ///
    /// # Errors
    /// Returns `NoRefreshToken` for an empty token, `Rejected` when the server
    /// refuses the grant, or a transport/parse error
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, OAuthClientError> {
        if refresh_token.is_empty() {
            return Err(OAuthClientError::NoRefreshToken);
        }

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
        ];
        self.post_token(&form).await
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, OAuthClientError> {
        let response = self.http.post(&self.settings.token_url).form(form).send().await?;
        let status = response.status();
        debug!(status = %status, "Token endpoint responded");

        if !status.is_success() {
            let body = response.json::<OAuthErrorBody>().await.ok();
            return Err(OAuthClientError::Rejected { status: status.as_u16(), body });
        }

        response.json().await.map_err(|e| OAuthClientError::ParseError(e.to_string()))
    }
}
