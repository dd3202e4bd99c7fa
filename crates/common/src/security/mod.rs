//! Security primitives for credentials at rest
//!
//! - [`keychain`]: platform keychain holding the master key
//! - [`cipher`]: the [`SecretCipher`] seam and its implementations
//! - [`credential_store`]: encrypted per-domain credential files

pub mod cipher;
pub mod credential_store;
pub mod keychain;

pub use cipher::{KeychainCipher, SecretCipher, StaticKeyCipher};
pub use credential_store::CredentialStore;
pub use keychain::{KeychainError, KeychainProvider};
