//! XRPC list client.
//!
//! Logs in with an app password, writes `app.bsky.graph.listitem` records
//! and pages through `app.bsky.graph.getList`. Rate-limit headers are
//! surfaced on every response, successful or not.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{Created, ListClient, MembershipPage, SubmitError, SubmitErrorKind};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::{Did, RateLimitHeaders};

pub const DEFAULT_SERVICE: &str = "https://bsky.social";

const LIST_ITEM_COLLECTION: &str = "app.bsky.graph.listitem";
const PAGE_LIMIT: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: SecretString,
    refresh_jwt: SecretString,
    did: String,
}

#[derive(Debug, Default, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetListResponse {
    cursor: Option<String>,
    #[serde(default)]
    items: Vec<ListItemView>,
}

#[derive(Debug, Deserialize)]
struct ListItemView {
    subject: ProfileView,
}

#[derive(Debug, Deserialize)]
struct ProfileView {
    did: String,
}

/// HTTP client for an atproto PDS.
pub struct XrpcListClient {
    http: reqwest::Client,
    service: String,
    identifier: String,
    password: SecretString,
    clock: Arc<dyn Clock>,
    session: RwLock<Option<Session>>,
}

impl XrpcListClient {
    pub fn new(
        service: impl Into<String>,
        identifier: impl Into<String>,
        password: SecretString,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("didlist/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            service: service.into(),
            identifier: identifier.into(),
            password,
            clock,
            session: RwLock::new(None),
        })
    }

    fn url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{nsid}", self.service.trim_end_matches('/'))
    }

    /// Exchange the refresh token for a new session.
    async fn refresh(&self) -> Result<()> {
        let refresh_jwt = {
            let session = self.session.read().await;
            let Some(session) = session.as_ref() else {
                return Err(Error::Auth("no session to refresh".to_string()));
            };
            session.refresh_jwt.expose_secret().to_string()
        };

        let response = self
            .http
            .post(self.url("com.atproto.server.refreshSession"))
            .bearer_auth(refresh_jwt)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body: XrpcErrorBody = response.json().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "refresh failed with status {status}: {}",
                body.message.or(body.error).unwrap_or_default()
            )));
        }

        let session: Session = response.json().await?;
        info!(did = %session.did, "session refreshed");
        *self.session.write().await = Some(session);
        Ok(())
    }
}

/// Both rate-limit headers, or nothing.
fn rate_limit_headers(headers: &HeaderMap) -> Option<RateLimitHeaders> {
    let remaining = headers.get("ratelimit-remaining")?.to_str().ok()?;
    let reset = headers.get("ratelimit-reset")?.to_str().ok()?;
    Some(RateLimitHeaders::new(remaining, reset))
}

#[async_trait]
impl ListClient for XrpcListClient {
    async fn authenticate(&self) -> Result<()> {
        let response = self
            .http
            .post(self.url("com.atproto.server.createSession"))
            .json(&json!({
                "identifier": self.identifier,
                "password": self.password.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| Error::Auth(format!("createSession request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body: XrpcErrorBody = response.json().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "createSession returned {status}: {}",
                body.message.or(body.error).unwrap_or_default()
            )));
        }

        let session: Session = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("bad createSession response: {e}")))?;
        info!(did = %session.did, "logged in");
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn create_list_entry(
        &self,
        list: &str,
        subject: &Did,
    ) -> std::result::Result<Created, SubmitError> {
        let (access_jwt, repo) = {
            let session = self.session.read().await;
            let Some(session) = session.as_ref() else {
                return Err(SubmitError::transient("not logged in"));
            };
            (
                session.access_jwt.expose_secret().to_string(),
                session.did.clone(),
            )
        };

        let body = json!({
            "repo": repo,
            "collection": LIST_ITEM_COLLECTION,
            "record": {
                "$type": LIST_ITEM_COLLECTION,
                "subject": subject.as_str(),
                "list": list,
                "createdAt": self.clock.now().to_rfc3339(),
            },
        });

        let response = self
            .http
            .post(self.url("com.atproto.repo.createRecord"))
            .bearer_auth(access_jwt)
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmitError::transient(format!("createRecord request failed: {e}")))?;

        let rate_limit = rate_limit_headers(response.headers());
        let status = response.status();
        if status.is_success() {
            debug!(%subject, "list entry created");
            return Ok(Created { rate_limit });
        }

        let status = status.as_u16();
        let body: XrpcErrorBody = response.json().await.unwrap_or_default();
        let kind = SubmitError::classify(status, body.error.as_deref());

        if body.error.as_deref() == Some("ExpiredToken") {
            if let Err(e) = self.refresh().await {
                warn!("session refresh failed: {e}");
            }
        }

        let message = match (body.error, body.message) {
            (Some(error), Some(message)) => format!("{error}: {message}"),
            (Some(text), None) | (None, Some(text)) => text,
            (None, None) => "no error body".to_string(),
        };
        let mut err = SubmitError::new(kind, message).with_status(status);
        if let Some(headers) = rate_limit {
            err = err.with_rate_limit(headers);
        }
        if kind == SubmitErrorKind::Permanent {
            debug!(%subject, %err, "createRecord rejected");
        }
        Err(err)
    }

    async fn fetch_list_membership(
        &self,
        list: &str,
        cursor: Option<&str>,
    ) -> Result<MembershipPage> {
        let access_jwt = {
            let session = self.session.read().await;
            let Some(session) = session.as_ref() else {
                return Err(Error::Auth("not logged in".to_string()));
            };
            session.access_jwt.expose_secret().to_string()
        };

        let limit = PAGE_LIMIT.to_string();
        let mut query = vec![("list", list), ("limit", limit.as_str())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }

        let response = self
            .http
            .get(self.url("app.bsky.graph.getList"))
            .bearer_auth(access_jwt)
            .query(&query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let status = status.as_u16();
            let body: XrpcErrorBody = response.json().await.unwrap_or_default();
            let kind = SubmitError::classify(status, body.error.as_deref());
            let message = body
                .message
                .or(body.error)
                .unwrap_or_else(|| "getList failed".to_string());
            return Err(SubmitError::new(kind, message).with_status(status).into());
        }
        let page: GetListResponse = response.json().await?;

        let mut items = Vec::with_capacity(page.items.len());
        for item in page.items {
            match Did::parse(item.subject.did) {
                Ok(did) => items.push(did),
                Err(e) => warn!("skipping list member: {e}"),
            }
        }
        Ok(MembershipPage {
            items,
            cursor: page.cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn rate_limit_headers_need_both_values() {
        let mut headers = HeaderMap::new();
        headers.insert("ratelimit-remaining", HeaderValue::from_static("3"));
        assert!(rate_limit_headers(&headers).is_none());

        headers.insert("ratelimit-reset", HeaderValue::from_static("1700000000"));
        assert_eq!(
            rate_limit_headers(&headers),
            Some(RateLimitHeaders::new("3", "1700000000"))
        );
    }

    #[test]
    fn get_list_response_parses_subjects() {
        let page: GetListResponse = serde_json::from_value(json!({
            "cursor": "abc",
            "list": {"uri": "at://x"},
            "items": [
                {"uri": "at://1", "subject": {"did": "did:plc:aaa", "handle": "a.test"}},
                {"uri": "at://2", "subject": {"did": "did:plc:bbb", "handle": "b.test"}}
            ]
        }))
        .unwrap();
        assert_eq!(page.cursor.as_deref(), Some("abc"));
        assert_eq!(page.items[1].subject.did, "did:plc:bbb");
    }

    #[test]
    fn url_joins_service_and_nsid() {
        let client = XrpcListClient::new(
            "https://pds.example/",
            "me.example",
            SecretString::from("pw"),
            Arc::new(crate::clock::SystemClock),
        )
        .unwrap();
        assert_eq!(
            client.url("app.bsky.graph.getList"),
            "https://pds.example/xrpc/app.bsky.graph.getList"
        );
    }
}
