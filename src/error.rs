//! Error types for didlist.

use std::path::PathBuf;

use thiserror::Error;

use crate::remote::SubmitError;

#[derive(Debug, Error)]
pub enum Error {
    /// Bootstrap has not finished; the caller should drop the event.
    #[error("work queue is not ready")]
    NotReady,

    #[error("snapshot {} is unreadable: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("remote submission failed: {0}")]
    Remote(#[from] SubmitError),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream event stream closed")]
    StreamClosed,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
