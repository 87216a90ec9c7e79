//! regwatch error types.

use std::time::Duration;

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while streaming or syncing notifications.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP client errors (connect, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("Unexpected HTTP status {status} from {url}")]
    InvalidStatus { status: u16, url: String },

    /// The stream endpoint did not answer with `text/event-stream`
    #[error("Unexpected content type for event stream: {0}")]
    InvalidContentType(String),

    /// The server closed the event stream
    #[error("Event stream ended")]
    StreamEnded,

    /// No traffic within the heartbeat window
    #[error("No message received within {0:?}")]
    HeartbeatTimeout(Duration),

    /// Opening the stream took too long
    #[error("Connection not established within {0:?}")]
    ConnectTimeout(Duration),

    /// Connection-level errors not covered above
    #[error("Connection error: {0}")]
    Connection(String),

    /// Payload decoding errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
