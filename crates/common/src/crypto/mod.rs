//! Cryptographic primitives for encrypting credentials at rest.

pub mod encryption;

pub use encryption::{CipherError, EncryptedData, EncryptionService};
