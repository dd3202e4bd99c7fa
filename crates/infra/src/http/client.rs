use std::time::Duration;

use reqwest::Client;
use tabula_domain::TabulaError;
use tracing::debug;

use crate::errors::InfraError;

/// Builder for the `reqwest` client shared by every token endpoint call.
///
/// Retries are not configured here: the token manager owns retry and backoff
/// for refreshes, and an authorization code must never be replayed.
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    connect_timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
    use_system_proxy: bool,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: Some(concat!("tabula/", env!("CARGO_PKG_VERSION")).to_string()),
            default_headers: None,
            use_system_proxy: true,
        }
    }
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Ignore `HTTP(S)_PROXY` settings, e.g. for loopback-only endpoints.
    pub fn no_proxy(mut self) -> Self {
        self.use_system_proxy = false;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    /// Returns `TabulaError::Config` when the TLS backend or headers are
    /// unusable.
    pub fn build(self) -> Result<Client, TabulaError> {
        let mut builder =
            Client::builder().timeout(self.timeout).connect_timeout(self.connect_timeout);

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        if !self.use_system_proxy {
            builder = builder.no_proxy();
        }

        debug!(timeout = ?self.timeout, proxy = self.use_system_proxy, "building HTTP client");
        Ok(builder.build().map_err(InfraError::from)?)
    }
}
