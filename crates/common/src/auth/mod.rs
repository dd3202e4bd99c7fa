//! Provider credential and token lifecycle
//!
//! Keeps AI-provider access tokens valid across static API keys and OAuth
//! Authorization Code + PKCE against a public client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  TokenManager   │  Façade: single-flight refresh, backoff, timers
//! └────────┬────────┘
//!          │ CredentialSource
//!          ├──► StaticKeySource       (API keys; refresh is a re-read)
//!          └──► OAuthFlowController   (connect flow + refresh grant)
//!                    │
//!                    ├──► OAuthClient       (authorize URL, token endpoint)
//!                    ├──► CallbackListener  (loopback redirect receiver)
//!                    └──► PKCE utilities
//!
//!   both sources persist through security::CredentialStore
//! ```
//!
//! # Module Organization
//!
//! - **[`pkce`]**: verifier, challenge and state generation
//! - **[`types`]**: token endpoint and callback wire types
//! - **[`client`]**: OAuth HTTP client
//! - **[`callback`]**: loopback callback listener
//! - **[`flow`]**: interactive connect flow and refresh grant
//! - **[`sources`]**: static API key source
//! - **[`token_manager`]**: the façade
//! - **[`traits`]**: seams between the above and the shell
//!
//! # Security
//!
//! - **PKCE S256**: the verifier never leaves the process until exchange
//! - **State Validation**: exact match before any code exchange
//! - **No Client Secrets**: public client only
//! - **Loopback Only**: the listener binds 127.0.0.1 and is closed on every
//!   terminal transition

pub mod callback;
pub mod client;
pub mod flow;
pub mod pkce;
pub mod sources;
pub mod token_manager;
pub mod traits;
pub mod types;

pub use callback::{CallbackEvent, CallbackListener, CallbackReply};
pub use client::{OAuthClient, OAuthClientError};
pub use flow::OAuthFlowController;
pub use pkce::{generate_code_challenge, generate_code_verifier, generate_state, validate_state, PkcePair};
pub use sources::StaticKeySource;
pub use token_manager::TokenManager;
pub use traits::{BrowserOpener, CredentialSource, RefreshError, RefreshScheduler};
pub use types::{CallbackParams, IdTokenClaims, OAuthErrorBody, TokenResponse};
