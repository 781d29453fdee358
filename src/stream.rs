//! Event stream listener.
//!
//! Reads JSON events from the Jetstream websocket (or one per line from a
//! file), pulls the subject DID out of feed interactions and hands it to
//! the lister. Malformed events are dropped
//! here and never reach the queue. The feed ending is an error: the
//! process is expected to exit and be restarted.

use std::sync::LazyLock;

use futures::{Stream, StreamExt};
use regex::Regex;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use crate::engine::Lister;
use crate::error::{Error, Result};
use crate::model::Did;
use crate::queue::Admission;

pub const DEFAULT_FEED_URL: &str = "wss://jetstream2.us-west.bsky.network/subscribe";

/// Collections whose records point at another account's post.
const FEED_COLLECTION_PREFIX: &str = "app.bsky.feed";

static DID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"did:plc:[a-zA-Z0-9]+").expect("valid DID pattern"));

/// Pull the subject DID out of one event.
///
/// Only commits to `app.bsky.feed.*` whose record has a string
/// `subject.uri` qualify; the first `did:plc:` token in that URI wins.
pub fn extract_subject(message: &str) -> Option<Did> {
    let event: Value = serde_json::from_str(message).ok()?;
    let commit = event.get("commit")?;

    let collection = commit.get("collection")?.as_str()?;
    if !collection.starts_with(FEED_COLLECTION_PREFIX) {
        return None;
    }

    let uri = commit
        .get("record")?
        .get("subject")?
        .get("uri")?
        .as_str()?;
    let found = DID_PATTERN.find(uri)?;
    Did::parse(found.as_str()).ok()
}

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The lister is not ready or is rate limited; the event was skipped.
    Paused,
    /// Not a feed interaction with a subject DID.
    Ignored,
    /// Bootstrap finished between the readiness check and the enqueue.
    NotReady,
    Admitted(Admission),
}

pub struct StreamListener {
    lister: Lister,
    /// Skip events while submissions are blocked, so pending does not fill
    /// up with identifiers that cannot be sent anyway.
    pause_when_limited: bool,
}

impl StreamListener {
    pub fn new(lister: Lister) -> Self {
        Self {
            lister,
            pause_when_limited: true,
        }
    }

    pub fn pause_when_limited(mut self, pause: bool) -> Self {
        self.pause_when_limited = pause;
        self
    }

    /// Handle one raw event.
    pub fn handle_message(&self, message: &str) -> Handled {
        if self.pause_when_limited && !self.lister.is_accepting() {
            return Handled::Paused;
        }
        let Some(did) = extract_subject(message) else {
            return Handled::Ignored;
        };
        match self.lister.enqueue(did) {
            Ok(admission) => Handled::Admitted(admission),
            Err(Error::NotReady) => Handled::NotReady,
            Err(e) => {
                debug!("dropping event: {e}");
                Handled::Ignored
            }
        }
    }

    /// Consume newline-delimited events until the reader ends.
    ///
    /// Lines that are not UTF-8 are skipped. Always returns an error:
    /// [`Error::StreamClosed`] when the feed ends, or the read error that
    /// broke it.
    pub async fn run<R>(&self, mut reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        info!("listening for events");
        let mut buf = Vec::new();
        let mut seen: u64 = 0;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            seen += 1;
            let Ok(line) = std::str::from_utf8(&buf) else {
                debug!(seen, "skipping non-UTF-8 event");
                continue;
            };
            self.handle_line(line.trim_end_matches(['\n', '\r']));
        }
        info!(seen, "event stream ended");
        Err(Error::StreamClosed)
    }

    /// Connect to a Jetstream endpoint and consume it until it closes.
    pub async fn connect(&self, url: &str) -> Result<()> {
        let (socket, response) = connect_async(url).await?;
        info!(url, status = response.status().as_u16(), "connected to feed");
        self.run_messages(socket).await
    }

    /// Consume websocket frames until the peer closes or the socket fails.
    ///
    /// Text frames are events; binary and control frames are ignored.
    pub async fn run_messages<S>(&self, mut messages: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
    {
        let mut seen: u64 = 0;
        while let Some(message) = messages.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    seen += 1;
                    self.handle_line(text.as_str());
                }
                Ok(Message::Close(frame)) => {
                    info!(seen, ?frame, "feed closed by peer");
                    return Err(Error::StreamClosed);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(seen, "feed connection error: {e}");
                    return Err(e.into());
                }
            }
        }
        info!(seen, "feed ended");
        Err(Error::StreamClosed)
    }

    fn handle_line(&self, message: &str) {
        if let Handled::Admitted(Admission::Queued) = self.handle_message(message) {
            debug!("queued identifier from stream");
        }
    }
}
