//! Remote list service.
//!
//! The queue only needs three things from the remote side: a session,
//! a way to add one entry, and a way to page through current membership.
//! [`ListClient`] is that seam; [`xrpc::XrpcListClient`] talks HTTP.

pub mod xrpc;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::Result;
use crate::model::{Did, RateLimitHeaders};

pub use xrpc::XrpcListClient;

/// How a failed submission should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmitErrorKind {
    /// The service refused because the quota is spent.
    QuotaExceeded,
    /// Network trouble, timeouts, server errors, expired sessions.
    Transient,
    /// The service will never accept this entry.
    Permanent,
}

impl SubmitErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitErrorKind::QuotaExceeded => "quota_exceeded",
            SubmitErrorKind::Transient => "transient",
            SubmitErrorKind::Permanent => "permanent",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{} (status {}): {message}", .kind.as_str(), status_text(.status))]
pub struct SubmitError {
    pub kind: SubmitErrorKind,
    pub status: Option<u16>,
    pub rate_limit: Option<RateLimitHeaders>,
    pub message: String,
}

impl SubmitError {
    pub fn new(kind: SubmitErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            rate_limit: None,
            message: message.into(),
        }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::QuotaExceeded, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Permanent, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_rate_limit(mut self, headers: RateLimitHeaders) -> Self {
        self.rate_limit = Some(headers);
        self
    }

    /// Map an HTTP failure onto a kind. `error_name` is the XRPC `error`
    /// field from the response body, if any.
    pub fn classify(status: u16, error_name: Option<&str>) -> SubmitErrorKind {
        match (status, error_name) {
            (429, _) | (_, Some("RateLimitExceeded")) => SubmitErrorKind::QuotaExceeded,
            (_, Some("ExpiredToken")) | (401, _) | (408, _) => SubmitErrorKind::Transient,
            (500..=599, _) => SubmitErrorKind::Transient,
            _ => SubmitErrorKind::Permanent,
        }
    }
}

fn status_text(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

/// A successful entry creation.
#[derive(Debug, Clone, Default)]
pub struct Created {
    pub rate_limit: Option<RateLimitHeaders>,
}

/// One page of list membership.
#[derive(Debug, Clone, Default)]
pub struct MembershipPage {
    pub items: Vec<Did>,
    pub cursor: Option<String>,
}

#[async_trait]
pub trait ListClient: Send + Sync {
    /// Establish a session. Failure aborts bootstrap.
    async fn authenticate(&self) -> Result<()>;

    /// Add `subject` to `list`.
    async fn create_list_entry(
        &self,
        list: &str,
        subject: &Did,
    ) -> std::result::Result<Created, SubmitError>;

    /// Fetch one page of `list` membership starting at `cursor`.
    async fn fetch_list_membership(
        &self,
        list: &str,
        cursor: Option<&str>,
    ) -> Result<MembershipPage>;
}
