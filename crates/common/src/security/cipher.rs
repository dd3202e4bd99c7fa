//! OS-backed symmetric encryption for credential files
//!
//! [`SecretCipher`] is the seam the credential store encrypts through.
//! [`KeychainCipher`] is the production implementation: the master key lives
//! in the platform keychain and payloads are sealed with AES-256-GCM.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::keychain::{KeychainError, KeychainProvider};
use crate::crypto::{CipherError, EncryptionService};

/// Keychain service name holding the master key.
pub const KEYCHAIN_SERVICE: &str = "Tabula.credentials";

/// Keychain account of the master key.
pub const MASTER_KEY_ID: &str = "master_key";

/// Symmetric encryption of opaque credential blobs
pub trait SecretCipher: Send + Sync {
    /// Whether encryption can be performed right now.
    fn is_available(&self) -> bool;

    /// Seal plaintext into an opaque string.
    ///
    /// # Errors
    /// `CipherError::Unavailable` when no key material can be obtained.
    fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError>;

    /// Open a string produced by [`SecretCipher::encrypt`].
    ///
    /// # Errors
    /// Any failure to authenticate or parse the blob.
    fn decrypt(&self, sealed: &str) -> Result<Vec<u8>, CipherError>;
}

/// Cipher whose master key is stored in the platform keychain.
///
/// The key is loaded (or generated) on first use and kept in-process for the
/// lifetime of the cipher. A failed keychain lookup is not cached, so a
/// keychain that becomes available later is picked up.
pub struct KeychainCipher {
    keychain: KeychainProvider,
    key_id: String,
    service: Mutex<Option<Arc<EncryptionService>>>,
}

impl std::fmt::Debug for KeychainCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainCipher")
            .field("service", &self.keychain.service_name())
            .field("key_id", &self.key_id)
            .field("loaded", &self.service.lock().is_some())
            .finish()
    }
}

impl KeychainCipher {
    #[must_use]
    pub fn new(keychain: KeychainProvider, key_id: impl Into<String>) -> Self {
        Self { keychain, key_id: key_id.into(), service: Mutex::new(None) }
    }

    /// Cipher over the default service and key id.
    #[must_use]
    pub fn system() -> Self {
        Self::new(KeychainProvider::new(KEYCHAIN_SERVICE), MASTER_KEY_ID)
    }

    fn service(&self) -> Result<Arc<EncryptionService>, CipherError> {
        let mut guard = self.service.lock();
        if let Some(service) = guard.as_ref() {
            return Ok(Arc::clone(service));
        }

        let key = self.keychain.get_or_create_key(&self.key_id).map_err(|e| match e {
            KeychainError::CorruptKey(reason) => {
                CipherError::Unavailable(format!("master key unusable: {reason}"))
            }
            other => CipherError::Unavailable(other.to_string()),
        })?;
        let service = Arc::new(EncryptionService::new(&key)?);
        debug!(fingerprint = %service.key_fingerprint(), "Loaded credential master key");
        *guard = Some(Arc::clone(&service));
        Ok(service)
    }
}

impl SecretCipher for KeychainCipher {
    fn is_available(&self) -> bool {
        match self.service() {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Credential encryption unavailable");
                false
            }
        }
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        self.service()?.seal(plaintext)
    }

    fn decrypt(&self, sealed: &str) -> Result<Vec<u8>, CipherError> {
        self.service()?.open(sealed)
    }
}

/// Cipher over a key supplied by the caller.
///
/// Used where the key is provisioned out of band (tests, headless runs with a
/// key from the environment).
#[derive(Debug)]
pub struct StaticKeyCipher {
    service: EncryptionService,
}

impl StaticKeyCipher {
    /// # Errors
    /// `CipherError::InvalidKeyLength` unless `key` is 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        Ok(Self { service: EncryptionService::new(key)? })
    }

    /// Cipher over a freshly generated random key.
    #[must_use]
    pub fn random() -> Self {
        Self { service: EncryptionService::with_random_key() }
    }
}

impl SecretCipher for StaticKeyCipher {
    fn is_available(&self) -> bool {
        true
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        self.service.seal(plaintext)
    }

    fn decrypt(&self, sealed: &str) -> Result<Vec<u8>, CipherError> {
        self.service.open(sealed)
    }
}
