//! Provider identifiers
//!
//! Every other credential entity is keyed by [`ProviderId`]; at most one live
//! instance of each entity type exists per provider.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::CREDENTIAL_FILE_EXTENSION;
use crate::errors::TabulaError;

/// Closed set of supported credential domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderId {
    /// Anthropic API key.
    #[serde(rename = "anthropic")]
    Anthropic,
    /// OpenAI platform API key.
    #[serde(rename = "openai")]
    OpenAi,
    /// OpenAI Codex via ChatGPT sign-in (Authorization Code + PKCE).
    #[serde(rename = "openai-codex")]
    OpenAiCodex,
}

/// Trust model a provider's credential follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Non-expiring API key entered by the user.
    StaticKey,
    /// OAuth access token with a refresh token.
    OAuth,
}

impl ProviderId {
    /// All providers, in a stable order.
    pub const ALL: [Self; 3] = [Self::Anthropic, Self::OpenAi, Self::OpenAiCodex];

    /// Stable identifier used in config, file names, and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::OpenAiCodex => "openai-codex",
        }
    }

    #[must_use]
    pub const fn kind(self) -> CredentialKind {
        match self {
            Self::Anthropic | Self::OpenAi => CredentialKind::StaticKey,
            Self::OpenAiCodex => CredentialKind::OAuth,
        }
    }

    /// Whether refresh delegates to an OAuth token endpoint.
    #[must_use]
    pub const fn supports_oauth_refresh(self) -> bool {
        matches!(self.kind(), CredentialKind::OAuth)
    }

    /// File name of this provider's encrypted credential payload.
    #[must_use]
    pub fn storage_file(self) -> String {
        format!("{}.{}", self.as_str(), CREDENTIAL_FILE_EXTENSION)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TabulaError::InvalidInput(format!("unknown provider: {s}")))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for types::provider.
    use super::*;

    /// Validates that every provider round-trips through its string form.
    #[test]
    fn test_provider_string_roundtrip() {
        for provider in ProviderId::ALL {
            assert_eq!(provider.as_str().parse::<ProviderId>().unwrap(), provider);
        }
        assert_eq!(" OpenAI-Codex ".parse::<ProviderId>().unwrap(), ProviderId::OpenAiCodex);
    }

    /// Validates rejection of unknown provider names.
    #[test]
    fn test_unknown_provider_rejected() {
        assert!(matches!("gemini".parse::<ProviderId>(), Err(TabulaError::InvalidInput(_))));
    }

    /// Validates trust model classification and storage file naming.
    #[test]
    fn test_kind_and_storage_file() {
        assert_eq!(ProviderId::Anthropic.kind(), CredentialKind::StaticKey);
        assert!(ProviderId::OpenAiCodex.supports_oauth_refresh());
        assert_eq!(ProviderId::OpenAiCodex.storage_file(), "openai-codex.enc");
    }

    /// Validates serde naming matches the string form.
    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ProviderId::OpenAiCodex).unwrap();
        assert_eq!(json, "\"openai-codex\"");
    }
}
