//! Secret redaction for log output

/// Shortest secret that still shows its first and last four characters.
const MIN_REVEAL_LEN: usize = 12;

/// Render a secret for logs as `abcd…wxyz`.
///
/// Secrets shorter than twelve characters are fully masked so the visible
/// part never exceeds a third of the value.
#[must_use]
pub fn redact_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < MIN_REVEAL_LEN {
        return "****".to_string();
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
