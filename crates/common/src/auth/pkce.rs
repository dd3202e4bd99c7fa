//! PKCE (Proof Key for Code Exchange) for OAuth 2.0 public clients
//!
//! Implements RFC 7636 with the `S256` method. Verifiers and state tokens are
//! 32 bytes from the OS RNG, base64url-encoded without padding (43 chars).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

const RANDOM_BYTES: usize = 32;

fn random_token() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let encoded = URL_SAFE_NO_PAD.encode(bytes);
    bytes.zeroize();
    encoded
}

/// Generate a cryptographically secure code verifier
///
/// Returns a 43-character URL-safe string, within the 43-128 range RFC 7636
/// requires.
#[must_use]
pub fn generate_code_verifier() -> String {
    random_token()
}

/// Generate the code challenge for a verifier
///
/// `BASE64URL-NOPAD(SHA256(ASCII(code_verifier)))`
///
/// # Arguments
/// * `verifier` - The code verifier string
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Generate a random state token for CSRF protection
#[must_use]
pub fn generate_state() -> String {
    random_token()
}

/// Validate that the callback state matches the one sent
///
/// Exact, case-sensitive equality; an empty `actual` never matches.
#[must_use]
pub fn validate_state(expected: &str, actual: &str) -> bool {
    !actual.is_empty() && expected == actual
}

/// PKCE verifier/challenge pair for one authorization attempt.
///
/// Never persisted; dropped (and zeroed) once the attempt ends.
#[derive(Clone)]
pub struct PkcePair {
    /// Kept secret until token exchange.
    pub verifier: String,
    /// Sent in the authorization request.
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair.
    ///
    /// # Examples
    /// ```
    /// use tabula_common::auth::pkce::PkcePair;
    ///
    /// let pair = PkcePair::generate();
    /// assert!(pair.verifier.len() >= 43 && pair.verifier.len() <= 128);
    /// ```
    #[must_use]
    pub fn generate() -> Self {
        let verifier = generate_code_verifier();
        let challenge = generate_code_challenge(&verifier);
        Self { verifier, challenge }
    }

    /// Get the challenge method (always "S256")
    #[must_use]
    pub const fn challenge_method(&self) -> &'static str {
        "S256"
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

impl Drop for PkcePair {
    fn drop(&mut self) {
        self.verifier.zeroize();
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::pkce.
    use super::*;

    /// Validates `PkcePair::generate` produces an RFC 7636 compliant pair.
    ///
    /// Assertions:
    /// - Verifier length is within 43..=128.
    /// - Challenge is the S256 transform of the verifier.
    #[test]
    fn test_generate_pkce_pair() {
        let pair = PkcePair::generate();
        assert!((43..=128).contains(&pair.verifier.len()));
        assert_eq!(pair.challenge, generate_code_challenge(&pair.verifier));
        assert_eq!(pair.challenge_method(), "S256");
    }

    /// Validates that successive pairs and states are unique.
    #[test]
    fn test_unique_values() {
        let a = PkcePair::generate();
        let b = PkcePair::generate();
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(generate_state(), generate_state());
    }

    /// Validates base64url encoding has no padding or unsafe characters.
    #[test]
    fn test_base64url_encoding() {
        let pair = PkcePair::generate();
        for value in [&pair.verifier, &pair.challenge, &generate_state()] {
            assert!(!value.contains('='));
            assert!(!value.contains('+'));
            assert!(!value.contains('/'));
        }
    }

    /// Validates the RFC 7636 appendix B test vector.
    #[test]
    fn test_code_challenge_known_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(generate_code_challenge(verifier), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    /// Validates exact-match state comparison.
    #[test]
    fn test_validate_state() {
        assert!(validate_state("abc", "abc"));
        assert!(!validate_state("abc", "ABC"));
        assert!(!validate_state("abc", "abcd"));
        assert!(!validate_state("", ""));
    }

    /// Validates Debug hides the verifier.
    #[test]
    fn test_debug_redacts_verifier() {
        let pair = PkcePair::generate();
        assert!(!format!("{pair:?}").contains(&pair.verifier));
    }
}
