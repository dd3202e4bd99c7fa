//! Static API key credential source
//!
//! Static keys never expire. A "refresh" re-reads the encrypted store so a
//! key changed out-of-band is picked up, and otherwise succeeds without any
//! network access.

use std::sync::Arc;

use async_trait::async_trait;
use tabula_domain::{CredentialPayload, ProviderId, TokenInfo};
use tracing::{debug, info};

use super::traits::{CredentialSource, RefreshError};
use crate::privacy::redact_secret;
use crate::security::CredentialStore;

/// Credential source for providers authenticated with a user-supplied key
#[derive(Debug)]
pub struct StaticKeySource {
    provider: ProviderId,
    store: Arc<CredentialStore>,
}

impl StaticKeySource {
    /// Source for `provider` reading from `store`.
    #[must_use]
    pub fn new(provider: ProviderId, store: Arc<CredentialStore>) -> Self {
        Self { provider, store }
    }

    /// Store a new key, replacing any previous one.
    ///
    /// Returns `false` when the key could not be persisted.
    pub async fn set_api_key(&self, api_key: &str) -> bool {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return self.clear().await;
        }

        let stored = self.store.set(CredentialPayload::with_api_key(api_key)).await;
        if stored {
            info!(provider = %self.provider, key = %redact_secret(api_key), "API key stored");
        }
        stored
    }

    /// Remove the stored key.
    pub async fn clear(&self) -> bool {
        let cleared = self.store.clear().await;
        debug!(provider = %self.provider, cleared, "API key cleared");
        cleared
    }

    async fn read_key(&self) -> Option<TokenInfo> {
        self.store
            .get()
            .await
            .api_key
            .filter(|key| !key.is_empty())
            .map(|key| TokenInfo::static_key(self.provider, key))
    }
}

#[async_trait]
impl CredentialSource for StaticKeySource {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn current(&self) -> Option<TokenInfo> {
        self.read_key().await
    }

    async fn refresh(&self) -> Result<TokenInfo, RefreshError> {
        self.store.invalidate_cache();
        self.read_key().await.ok_or(RefreshError::NoCredential)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::sources.
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::security::StaticKeyCipher;

    fn source(dir: &TempDir) -> StaticKeySource {
        let store = CredentialStore::new(
            dir.path().join("anthropic.enc"),
            Arc::new(StaticKeyCipher::random()),
            Duration::from_secs(5),
        );
        StaticKeySource::new(ProviderId::Anthropic, Arc::new(store))
    }

    /// Validates a stored key is returned as a non-expiring token.
    #[tokio::test]
    async fn test_set_and_read_key() {
        let dir = TempDir::new().unwrap();
        let source = source(&dir);

        assert!(source.current().await.is_none());
        assert!(source.set_api_key("  sk-ant-123  ").await);

        let token = source.current().await.unwrap();
        assert_eq!(token.token, "sk-ant-123");
        assert!(token.is_static());
        assert_eq!(token.provider, ProviderId::Anthropic);
    }

    /// Validates refresh is a re-read that succeeds when a key exists.
    #[tokio::test]
    async fn test_refresh_rereads_key() {
        let dir = TempDir::new().unwrap();
        let source = source(&dir);

        assert_eq!(source.refresh().await, Err(RefreshError::NoCredential));

        source.set_api_key("sk-1").await;
        assert_eq!(source.refresh().await.unwrap().token, "sk-1");
    }

    /// Validates an empty key clears the stored one.
    #[tokio::test]
    async fn test_empty_key_clears() {
        let dir = TempDir::new().unwrap();
        let source = source(&dir);

        source.set_api_key("sk-1").await;
        assert!(source.set_api_key("   ").await);
        assert!(source.current().await.is_none());
    }
}
