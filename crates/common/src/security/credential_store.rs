//! Encrypted-at-rest credential persistence with a short-lived read cache
//!
//! One [`CredentialStore`] owns one file. The file holds the whole
//! [`CredentialPayload`] of a credential domain, serialized to JSON and sealed
//! by a [`SecretCipher`]. Reads are served from a TTL cache; writes replace
//! the whole file atomically.
//!
//! Every failure degrades to "no credential": a missing, unreadable or
//! undecryptable file reads as an empty payload, and a write that cannot be
//! encrypted or persisted is logged and skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tabula_domain::CredentialPayload;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::cipher::SecretCipher;

/// Per-file encrypted credential store
pub struct CredentialStore {
    path: PathBuf,
    cipher: Arc<dyn SecretCipher>,
    cache: Cache<(), CredentialPayload>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .field("cached", &self.cache.contains_key(&()))
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Create a store for `path`.
    ///
    /// # Arguments
    /// * `path` - Encrypted file owned by this store; no other store may use it
    /// * `cipher` - Encryption used for every read and write
    /// * `cache_ttl` - How long a decrypted payload is served from memory
    pub fn new(path: impl Into<PathBuf>, cipher: Arc<dyn SecretCipher>, cache_ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(cache_ttl).build();
        Self { path: path.into(), cipher, cache, write_lock: Mutex::new(()) }
    }

    /// Encrypted file this store owns.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current payload, from cache when fresh, otherwise from disk.
    ///
    /// A cache miss reads under the write lock so a `set` or `clear` that
    /// lands during the read cannot be overwritten by the older payload.
    pub async fn get(&self) -> CredentialPayload {
        if let Some(cached) = self.cache.get(&()) {
            return cached;
        }

        let _guard = self.write_lock.lock().await;
        if let Some(cached) = self.cache.get(&()) {
            return cached;
        }

        let payload = self.read_from_disk().await;
        self.cache.insert((), payload.clone());
        payload
    }

    /// Replace the payload.
    ///
    /// The cache reflects `payload` immediately. Returns `false` when the
    /// payload could not be persisted (encryption unavailable or I/O error);
    /// the failure has already been logged.
    pub async fn set(&self, payload: CredentialPayload) -> bool {
        let _guard = self.write_lock.lock().await;
        self.cache.insert((), payload.clone());
        self.persist(&payload).await
    }

    /// Empty the cache and persist an empty payload.
    pub async fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        self.cache.invalidate(&());
        self.persist(&CredentialPayload::default()).await
    }

    /// Drop the cached payload so the next read goes to disk.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate(&());
    }

    async fn read_from_disk(&self) -> CredentialPayload {
        let sealed = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No credential file");
                return CredentialPayload::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read credential file");
                return CredentialPayload::default();
            }
        };

        if sealed.trim().is_empty() {
            return CredentialPayload::default();
        }

        let plaintext = match self.cipher.decrypt(&sealed) {
            Ok(plaintext) => zeroize::Zeroizing::new(plaintext),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to decrypt credential file");
                return CredentialPayload::default();
            }
        };

        serde_json::from_slice(&plaintext).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Credential file is not a valid payload");
            CredentialPayload::default()
        })
    }

    async fn persist(&self, payload: &CredentialPayload) -> bool {
        if !self.cipher.is_available() {
            warn!(
                path = %self.path.display(),
                "Encryption unavailable; credential not persisted"
            );
            return false;
        }

        let plaintext = match serde_json::to_vec(payload) {
            Ok(bytes) => zeroize::Zeroizing::new(bytes),
            Err(e) => {
                warn!(error = %e, "Failed to serialize credential payload");
                return false;
            }
        };

        let sealed = match self.cipher.encrypt(&plaintext) {
            Ok(sealed) => sealed,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to encrypt credential payload");
                return false;
            }
        };

        match write_atomically(&self.path, sealed.as_bytes()).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Credential payload persisted");
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to write credential file");
                false
            }
        }
    }
}

/// Write via a sibling temp file and rename so readers never see a torn file.
async fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    // Only a directory created here is tightened; an existing one is left
    // alone and the file mode protects the payload.
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !tokio::fs::try_exists(parent).await.unwrap_or(false) {
            tokio::fs::create_dir_all(parent).await?;
            restrict_permissions(parent, 0o700).await?;
        }
    }

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("credentials");
    let temp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    if let Err(e) = write_temp(&temp, contents).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}

async fn write_temp(temp: &Path, contents: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(temp).await?;
    restrict_permissions(temp, 0o600).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
