//! Privacy helpers for keeping secret material out of logs.

pub mod redact;

pub use redact::redact_secret;
