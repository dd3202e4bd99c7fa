//! Platform keychain access for the credential master key
//!
//! A thin wrapper over the platform keychain (`keyring` crate): macOS
//! Keychain Access, Windows Credential Manager, Linux kernel keyutils. Only
//! the master key lives here; credential payloads are files encrypted with it.
//!
//! ## Usage
//!
//! ```no_run
//! use tabula_common::security::keychain::KeychainProvider;
//!
//! let keychain = KeychainProvider::new("Tabula.credentials");
//! let key = keychain.get_or_create_key("master_key")?;
//! assert_eq!(key.len(), 32);
//! # Ok::<(), tabula_common::security::KeychainError>(())
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use keyring::Entry;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::EncryptionService;

/// Keychain provider scoped to one service name
#[derive(Debug, Clone)]
pub struct KeychainProvider {
    service_name: String,
}

impl KeychainProvider {
    /// Create a new keychain provider for a specific service
    ///
    /// # Arguments
    /// * `service_name` - Service identifier (e.g., "Tabula.credentials")
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Store a secret value in the platform keychain
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if keychain access fails
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "Storing secret in keychain");

        self.create_entry(key)?.set_password(value).map_err(|e| {
            KeychainError::AccessFailed(format!("Failed to store secret for {key}: {e}"))
        })
    }

    /// Retrieve a secret value from the platform keychain
    ///
    /// # Errors
    /// Returns `KeychainError::NotFound` if secret doesn't exist
    /// Returns `KeychainError::AccessFailed` if keychain access fails
    pub fn get_secret(&self, key: &str) -> Result<Zeroizing<String>, KeychainError> {
        let entry = self.create_entry(key)?;
        entry.get_password().map(Zeroizing::new).map_err(|e| match e {
            keyring::Error::NoEntry => KeychainError::NotFound,
            other => {
                KeychainError::AccessFailed(format!("Failed to retrieve secret for {key}: {other}"))
            }
        })
    }

    /// Delete a secret from the platform keychain (idempotent)
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if keychain access fails
    pub fn delete_secret(&self, key: &str) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "Deleting secret from keychain");

        match self.create_entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeychainError::AccessFailed(format!(
                "Failed to delete secret for {key}: {e}"
            ))),
        }
    }

    /// Get or create a 32-byte encryption key
    ///
    /// The key is stored base64-encoded. When no entry exists a new random
    /// key is generated and persisted before being returned.
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if keychain access fails and
    /// `KeychainError::CorruptKey` if the stored value is not a 32-byte key
    pub fn get_or_create_key(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeychainError> {
        match self.get_secret(key_id) {
            Ok(encoded) => {
                let key = BASE64
                    .decode(encoded.as_bytes())
                    .map(Zeroizing::new)
                    .map_err(|e| KeychainError::CorruptKey(e.to_string()))?;
                if key.len() != crate::crypto::encryption::KEY_LEN {
                    return Err(KeychainError::CorruptKey(format!(
                        "expected 32 bytes, found {}",
                        key.len()
                    )));
                }
                Ok(key)
            }
            Err(KeychainError::NotFound) => {
                debug!(
                    service = %self.service_name,
                    key_id = %key_id,
                    "No existing key found, generating new key"
                );
                let key = EncryptionService::generate_key();
                let encoded = Zeroizing::new(BASE64.encode(key.as_slice()));
                self.set_secret(key_id, &encoded)?;
                Ok(key)
            }
            Err(e) => Err(e),
        }
    }

    fn create_entry(&self, account: &str) -> Result<Entry, KeychainError> {
        Entry::new(&self.service_name, account).map_err(|e| {
            KeychainError::AccessFailed(format!("Failed to create keychain entry: {e}"))
        })
    }
}

/// Keychain error types
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Keychain access failed (permission denied, no backend, etc.)
    #[error("Keychain access failed: {0}")]
    AccessFailed(String),

    /// Entry not found in keychain
    #[error("Entry not found")]
    NotFound,

    /// Stored key is not valid key material
    #[error("Stored key is corrupt: {0}")]
    CorruptKey(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for security::keychain.
    use super::*;

    /// Validates `KeychainProvider::new` keeps the service name.
    #[test]
    fn test_keychain_provider_creation() {
        let keychain = KeychainProvider::new("test-service");
        assert_eq!(keychain.service_name(), "test-service");
    }

    /// Validates error messages are descriptive.
    #[test]
    fn test_error_display() {
        assert_eq!(KeychainError::NotFound.to_string(), "Entry not found");
        assert!(KeychainError::AccessFailed("denied".into()).to_string().contains("denied"));
    }
}
