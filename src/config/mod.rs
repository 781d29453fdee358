//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The account password is wrapped in secrecy::SecretString so it never
//! reaches a log line.

pub mod secrets;

use crate::error::{Error, Result};
use crate::remote::xrpc::DEFAULT_SERVICE;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    /// Account handle or DID used to log in.
    pub username: String,
    pub password: SecretString,
    /// AT-URI of the moderation list entries are added to.
    pub list: String,
    /// PDS base URL.
    pub service: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            username: required_var("BSKY_USERNAME")?,
            password: SecretString::from(required_var("BSKY_PASSWORD")?),
            list: required_var("BSKY_LIST")?,
            service: std::env::var("BSKY_SERVICE").unwrap_or_else(|_| DEFAULT_SERVICE.to_string()),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!(
            "required environment variable {name} is not set"
        ))),
    }
}
