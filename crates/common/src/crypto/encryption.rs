//! AES-256-GCM envelope encryption for credential payloads.
//!
//! - [`EncryptionService`]: seals and opens byte payloads with a 32-byte key
//! - [`EncryptedData`]: serializable envelope (`nonce`, `ciphertext`,
//!   `algorithm`)
//!
//! The at-rest representation is the base64 encoding of the JSON envelope, so
//! an encrypted credential file is a single opaque line of text.
//!
//! ## Usage
//!
//! ```rust
//! use tabula_common::crypto::EncryptionService;
//!
//! let key = EncryptionService::generate_key();
//! let service = EncryptionService::new(&key)?;
//!
//! let sealed = service.seal(b"{\"apiKey\":\"sk-live\"}")?;
//! assert_eq!(service.open(&sealed)?, b"{\"apiKey\":\"sk-live\"}");
//! # Ok::<(), tabula_common::crypto::CipherError>(())
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

/// Algorithm tag written into every envelope.
pub const ALGORITHM: &str = "AES-256-GCM";

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

/// Errors raised while sealing or opening payloads
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// OS-backed key material could not be obtained.
    #[error("encryption unavailable: {0}")]
    Unavailable(String),

    #[error("encryption key must be exactly {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// Wrong key, tampered ciphertext or truncated nonce.
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// The blob is not a base64 JSON envelope.
    #[error("malformed encrypted payload: {0}")]
    Malformed(String),
}

/// Encrypted data container persisted at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// 96-bit GCM nonce.
    pub nonce: Vec<u8>,
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
    /// Algorithm identifier.
    pub algorithm: String,
}

/// AES-GCM encryption service bound to one key.
pub struct EncryptionService {
    cipher: Aes256Gcm,
    fingerprint: String,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService")
            .field("key", &"[REDACTED]")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl EncryptionService {
    /// Create a service from a raw 32-byte key.
    ///
    /// # Errors
    /// Returns `CipherError::InvalidKeyLength` for any other key size.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength(key.len()));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;

        let digest = Sha256::digest(key);
        let fingerprint = BASE64.encode(&digest[..8]);

        Ok(Self { cipher, fingerprint })
    }

    /// Service over a fresh random key that never leaves the process.
    #[must_use]
    pub fn with_random_key() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut *key);
        let cipher = Aes256Gcm::new(&(*key).into());
        let fingerprint = BASE64.encode(&Sha256::digest(&*key)[..8]);
        Self { cipher, fingerprint }
    }

    /// Generate a random 32-byte symmetric key.
    #[must_use]
    pub fn generate_key() -> Zeroizing<Vec<u8>> {
        let mut key = Zeroizing::new(vec![0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Short, non-reversible identifier of the key for diagnostics.
    #[must_use]
    pub fn key_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Encrypt bytes into an [`EncryptedData`] envelope under a fresh nonce.
    ///
    /// # Errors
    /// Returns `CipherError::Encrypt` if the AEAD operation fails.
    pub fn encrypt(&self, data: &[u8]) -> Result<EncryptedData, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(&Nonce::from(nonce), data)
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        Ok(EncryptedData { nonce: nonce.to_vec(), ciphertext, algorithm: ALGORITHM.to_string() })
    }

    /// Decrypt an [`EncryptedData`] envelope back into raw bytes.
    ///
    /// # Errors
    /// Returns `CipherError::Malformed` for an unknown algorithm or nonce size
    /// and `CipherError::Decrypt` when authentication fails.
    pub fn decrypt(&self, encrypted: &EncryptedData) -> Result<Vec<u8>, CipherError> {
        if encrypted.algorithm != ALGORITHM {
            return Err(CipherError::Malformed(format!(
                "unsupported algorithm {}",
                encrypted.algorithm
            )));
        }

        let nonce: [u8; NONCE_LEN] = encrypted.nonce.as_slice().try_into().map_err(|_| {
            CipherError::Malformed(format!("nonce must be {NONCE_LEN} bytes"))
        })?;

        self.cipher
            .decrypt(&Nonce::from(nonce), encrypted.ciphertext.as_ref())
            .map_err(|e| CipherError::Decrypt(e.to_string()))
    }

    /// Encrypt and encode as the opaque at-rest string.
    ///
    /// # Errors
    /// Propagates [`EncryptionService::encrypt`] failures.
    pub fn seal(&self, data: &[u8]) -> Result<String, CipherError> {
        let encrypted = self.encrypt(data)?;
        let serialized =
            serde_json::to_vec(&encrypted).map_err(|e| CipherError::Encrypt(e.to_string()))?;
        Ok(BASE64.encode(serialized))
    }

    /// Decode an at-rest string and decrypt it.
    ///
    /// # Errors
    /// Returns `CipherError::Malformed` for bad base64 or JSON, otherwise
    /// propagates [`EncryptionService::decrypt`] failures.
    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, CipherError> {
        let decoded = BASE64
            .decode(sealed.trim())
            .map_err(|e| CipherError::Malformed(format!("base64: {e}")))?;
        let encrypted: EncryptedData = serde_json::from_slice(&decoded)
            .map_err(|e| CipherError::Malformed(format!("envelope: {e}")))?;
        self.decrypt(&encrypted)
    }
}
