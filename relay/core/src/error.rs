//! Error Types
//!
//! Error taxonomy for the relay core. Parse failures never surface here:
//! malformed upstream lines are dropped inside the pipeline. What remains are
//! transport failures (forwarded to the renderer as terminal errors), session
//! store I/O, and configuration problems.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while opening or reading an agent connection
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection to the agent backend failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connecting took longer than the configured timeout
    #[error("Connection timed out after {0} ms")]
    Timeout(u64),

    /// The outbound request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The HTTP endpoint answered with a non-success status
    #[error("Agent returned {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// Protocol-level failure on an open connection
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The connection was closed by the peer
    #[error("Connection closed")]
    ConnectionClosed,

    /// IO error from the underlying socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::ConnectionFailed(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::ConnectionFailed(err.to_string())
        } else {
            Self::Protocol(err.to_string())
        }
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::ConnectionClosed,
            WsError::Io(e) => Self::Io(e),
            WsError::Http(response) => Self::Http {
                status: response.status().as_u16(),
                body: String::new(),
            },
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Errors from the durable thread → session store
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// Reading or writing the store file failed
    #[error("Session store I/O at {path}: {source}")]
    Io {
        /// Store file path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The store file exists but is not valid JSON
    #[error("Session store at {path} is corrupt: {source}")]
    Corrupt {
        /// Store file path
        path: PathBuf,
        /// Underlying parse error
        source: serde_json::Error,
    },
}

/// Umbrella error for relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Session store failure
    #[error(transparent)]
    SessionStore(#[from] SessionStoreError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Serialization of an outbound message failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
