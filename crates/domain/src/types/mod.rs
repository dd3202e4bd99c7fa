//! Domain types and models

pub mod credentials;
pub mod flow;
pub mod provider;
pub mod refresh;
pub mod token;

pub use credentials::{CredentialPayload, StoredCredentials};
pub use flow::{ConnectResult, ConnectionStatus, FlowStatus};
pub use provider::{CredentialKind, ProviderId};
pub use refresh::RefreshState;
pub use token::TokenInfo;
