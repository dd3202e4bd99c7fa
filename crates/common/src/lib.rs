//! Credential and token lifecycle shared across Tabula crates.
//!
//! # Safety and Quality
//!
//! This crate enforces strict safety and quality standards to ensure
//! reliability across all Tabula components.
//!
//! # Modules
//!
//! - `auth`: token manager, OAuth connect flow, PKCE, static key source
//! - `security`: keychain master key, cipher seam, encrypted credential store
//! - `crypto`: AES-256-GCM envelope encryption
//! - `resilience`: refresh backoff and jitter
//! - `privacy`: secret redaction for logs
//! - `testing`: mocks for the seams above (`test-utils` feature)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod crypto;
pub mod privacy;
pub mod resilience;
pub mod security;

// Testing utilities
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

pub use auth::{
    BrowserOpener, CredentialSource, OAuthClient, OAuthFlowController, RefreshError,
    RefreshScheduler, StaticKeySource, TokenManager,
};
pub use crypto::{CipherError, EncryptedData, EncryptionService};
pub use privacy::redact_secret;
pub use security::{CredentialStore, KeychainCipher, KeychainProvider, SecretCipher};
