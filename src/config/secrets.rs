//! Secret handling utilities.
//!
//! Re-exports the secrecy types used for credentials and session tokens.

pub use secrecy::{ExposeSecret, SecretString};

/// Mask a secret for display, keeping only its length.
pub fn redacted(secret: &SecretString) -> String {
    format!("[redacted; {} chars]", secret.expose_secret().chars().count())
}
