//! Core data model.
//!
//! A DID is the only thing that moves through the system. It lives in
//! exactly one of three places at a time: pending, in flight, or added.

use serde::Serialize;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Decentralized identifier naming an account upstream.
///
/// Opaque: equality is exact string equality, no normalization is applied.
/// Construction only rejects tokens that could not survive a round trip
/// through the newline-delimited snapshot files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Did(String);

impl Did {
    /// Validate and wrap a raw identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if !raw.starts_with("did:") {
            return Err(Error::Parse(format!("not a did: {raw:?}")));
        }
        if raw.len() <= "did:".len() || raw.chars().any(char::is_whitespace) {
            return Err(Error::Parse(format!("malformed did: {raw:?}")));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Did {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Submission outcome
// ---------------------------------------------------------------------------

/// How an in-flight submission ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Entry exists on the remote list.
    Success,
    /// Worth another attempt; goes back to pending.
    Retryable,
    /// Remote service will never accept it; dropped.
    Fatal,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::Retryable => "retryable",
            Outcome::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Rate limit metadata
// ---------------------------------------------------------------------------

/// Raw rate-limit response headers, kept as text until observed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RateLimitHeaders {
    /// `ratelimit-remaining`
    pub remaining: String,
    /// `ratelimit-reset`, epoch seconds
    pub reset: String,
}

impl RateLimitHeaders {
    pub fn new(remaining: impl Into<String>, reset: impl Into<String>) -> Self {
        Self {
            remaining: remaining.into(),
            reset: reset.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Set sizes, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueStats {
    pub added: usize,
    pub pending: usize,
    pub in_flight: usize,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "added: {} pending: {} in_flight: {}",
            self.added, self.pending, self.in_flight
        )
    }
}
