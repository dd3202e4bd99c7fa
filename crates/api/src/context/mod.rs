//! Application context - dependency injection container
//!
//! Built once per process. Owns one credential store per provider, the
//! credential sources over them, and the single [`TokenManager`] every token
//! request goes through.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};

use tabula_common::auth::{
    BrowserOpener, CredentialSource, OAuthClient, OAuthFlowController, RefreshScheduler,
    StaticKeySource, TokenManager,
};
use tabula_common::security::{CredentialStore, KeychainCipher, SecretCipher};
use tabula_domain::{AuthConfig, CredentialKind, ProviderId, Result, TabulaError};
use tabula_infra::{HttpClientBuilder, SystemBrowser};
use tracing::{debug, info, warn};

use crate::utils::health::{ComponentHealth, HealthStatus};

/// Application context - holds all services and dependencies
pub struct AppContext {
    /// Validated configuration the context was built from.
    pub config: AuthConfig,
    /// Token façade shared by every provider.
    pub token_manager: Arc<TokenManager>,
    /// Interactive sign-in for OpenAI Codex.
    pub codex: Arc<OAuthFlowController>,
    static_keys: HashMap<ProviderId, Arc<StaticKeySource>>,
    cipher: Arc<dyn SecretCipher>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("storage_dir", &self.config.storage_dir)
            .field("providers", &self.token_manager.providers().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Create the production context: keychain-backed encryption, the system
    /// browser, and a proxy-aware HTTP client.
    ///
    /// # Errors
    /// Returns `TabulaError::Config` when the configuration is invalid or
    /// the HTTP client cannot be built.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = HttpClientBuilder::new().build()?;
        Self::with_components(
            config,
            Arc::new(KeychainCipher::system()),
            Arc::new(SystemBrowser::from_env()),
            http,
        )
    }

    /// Create a context from explicit components.
    ///
    /// Tests use this to supply an in-memory cipher, a recording browser and
    /// a client that talks to a local token endpoint.
    ///
    /// # Errors
    /// Returns `TabulaError::Config` when the configuration is invalid.
    pub fn with_components(
        config: AuthConfig,
        cipher: Arc<dyn SecretCipher>,
        browser: Arc<dyn BrowserOpener>,
        http: reqwest::Client,
    ) -> Result<Self> {
        config.validate()?;

        let store_for = |provider: ProviderId| {
            Arc::new(CredentialStore::new(
                config.storage_dir.join(provider.storage_file()),
                Arc::clone(&cipher),
                config.cache_ttl(),
            ))
        };

        let mut static_keys = HashMap::new();
        let mut sources: Vec<Arc<dyn CredentialSource>> = Vec::new();
        for provider in ProviderId::ALL {
            if provider.kind() == CredentialKind::StaticKey {
                let source = Arc::new(StaticKeySource::new(provider, store_for(provider)));
                sources.push(source.clone());
                static_keys.insert(provider, source);
            }
        }

        let codex = Arc::new(OAuthFlowController::new(
            ProviderId::OpenAiCodex,
            OAuthClient::new(config.codex.clone(), http),
            store_for(ProviderId::OpenAiCodex),
            browser,
        ));
        sources.push(codex.clone());

        let token_manager = TokenManager::new(sources, config.refresh.clone());
        let scheduler: Weak<dyn RefreshScheduler> =
            Arc::downgrade(&token_manager) as Weak<dyn RefreshScheduler>;
        codex.attach_scheduler(scheduler);

        info!(storage_dir = %config.storage_dir.display(), "Application context initialized");
        Ok(Self { config, token_manager, codex, static_keys, cipher })
    }

    /// Arm proactive refresh for credentials persisted by an earlier run.
    pub async fn start(&self) {
        if self.codex.resume().await {
            debug!(provider = %ProviderId::OpenAiCodex, "Resumed OAuth refresh cadence");
        }
        self.token_manager.resume_schedules().await;
    }

    /// Registered providers, in a stable order.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut providers: Vec<_> = self.token_manager.providers().collect();
        providers.sort();
        providers
    }

    /// Static-key source of `provider`, if it uses one.
    #[must_use]
    pub fn static_key_source(&self, provider: ProviderId) -> Option<&Arc<StaticKeySource>> {
        self.static_keys.get(&provider)
    }

    /// OAuth controller of `provider`, if it signs in interactively.
    #[must_use]
    pub fn oauth_controller(&self, provider: ProviderId) -> Option<&Arc<OAuthFlowController>> {
        (provider == self.codex.provider()).then_some(&self.codex)
    }

    /// Check encryption, storage and per-provider refresh health.
    pub async fn health_check(&self) -> HealthStatus {
        let mut status = HealthStatus::new();

        status = status.add_component(if self.cipher.is_available() {
            ComponentHealth::healthy("encryption")
        } else {
            ComponentHealth::unavailable("encryption", "OS-backed encryption is not available")
        });

        status = status.add_component(storage_health(&self.config.storage_dir));

        for provider in ProviderId::ALL {
            let name = format!("refresh:{provider}");
            let failures = self.token_manager.refresh_state(provider).consecutive_failures;
            status = status.add_component(if failures == 0 {
                ComponentHealth::healthy(name)
            } else {
                ComponentHealth::degraded(name, format!("{failures} consecutive refresh failures"))
            });
        }

        status.finish()
    }

    /// Stop all background refresh work.
    ///
    /// Stored credentials are kept; the next [`AppContext::start`] resumes
    /// from them.
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutdown called on AppContext");
        if self.codex.status().is_pending() {
            warn!("Shutting down with an interactive sign-in still pending");
        }
        self.token_manager.clear_all();
        Ok(())
    }
}

fn storage_health(dir: &Path) -> ComponentHealth {
    if dir.is_dir() {
        match std::fs::metadata(dir) {
            Ok(meta) if meta.permissions().readonly() => {
                ComponentHealth::unavailable("storage", format!("{} is read-only", dir.display()))
            }
            Ok(_) => ComponentHealth::healthy("storage"),
            Err(e) => ComponentHealth::unavailable("storage", e.to_string()),
        }
    } else if dir.exists() {
        ComponentHealth::unavailable("storage", format!("{} is not a directory", dir.display()))
    } else {
        // Created on first write.
        ComponentHealth::healthy("storage")
    }
}

/// Error for an operation a provider's credential kind does not support.
pub(crate) fn unsupported(provider: ProviderId, operation: &str) -> TabulaError {
    TabulaError::InvalidInput(format!("{provider} does not support {operation}"))
}
