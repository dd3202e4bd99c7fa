//! Testing utilities and helpers
//!
//! - **[`mocks`]**: Mock implementations of the auth and security seams
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tabula_common::auth::{CredentialSource, TokenManager};
//! use tabula_common::testing::MockCredentialSource;
//! use tabula_domain::{ProviderId, RefreshPolicy};
//!
//! let source = Arc::new(MockCredentialSource::static_key(ProviderId::Anthropic, "sk-test"));
//! let manager = TokenManager::new([source as Arc<dyn CredentialSource>], RefreshPolicy::default());
//! assert_eq!(manager.providers().count(), 1);
//! ```

pub mod mocks;

pub use mocks::{
    fake_id_token, free_port, MockBrowser, MockCredentialSource, UnavailableCipher,
};
