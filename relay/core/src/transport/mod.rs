//! Transport Layer for Agent Connections
//!
//! Owns the live connection to the agent backend. Every request opens a fresh
//! connection; there is no multiplexing of conversations over one socket.
//!
//! - `websocket`: duplex socket, one initiating JSON message, line-delimited
//!   events back (feature `websocket`)
//! - `http`: JSON POST, streamed response body (newline-delimited or SSE)
//! - `in_process`: channel pair for embedding and tests
//!
//! A transport only moves bytes. Framing, parsing and translation happen in
//! [`crate::pipeline`].

pub mod factory;
pub mod frame;
pub mod http;
pub mod in_process;
#[cfg(feature = "websocket")]
pub mod websocket;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::TransportError;

pub use factory::create_transport;
pub use frame::LineDecoder;
pub use http::HttpStreamTransport;
pub use in_process::{InProcessTransport, IncomingRequest};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

/// Buffered transport events per connection
pub(crate) const CONNECTION_BUFFER: usize = 64;

/// The one message sent to open a response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// User message
    pub content: String,
    /// Bearer token, if authenticated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Backend session to resume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AgentRequest {
    /// Anonymous request with no session
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            token: None,
            session_id: None,
        }
    }

    /// Attach a bearer token (empty tokens are ignored)
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Attach a session to resume
    #[must_use]
    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id.filter(|s| !s.is_empty());
        self
    }

    /// `Authorization` header value, if a token is present
    #[must_use]
    pub fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }
}

/// What a live connection delivers
#[derive(Debug)]
pub enum TransportEvent {
    /// Raw bytes from the agent
    Data(Vec<u8>),
    /// The connection failed; no further events follow
    Error(TransportError),
}

/// One open connection to the agent
///
/// The reading side runs in its own task and forwards [`TransportEvent`]s
/// over a channel. The end of the channel is the end of the stream. Closing
/// (or dropping) the connection stops the reader task.
#[derive(Debug)]
pub struct Connection {
    events: mpsc::Receiver<TransportEvent>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    /// Wrap a channel fed by `reader`
    #[must_use]
    pub fn new(events: mpsc::Receiver<TransportEvent>, reader: Option<JoinHandle<()>>) -> Self {
        Self { events, reader }
    }

    /// Next event, or `None` at end of stream
    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Stop reading and release the connection
    ///
    /// Safe to call more than once.
    pub fn close(&mut self) {
        self.events.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// A way of reaching the agent backend
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Open a connection and send `request`
    ///
    /// Resolves once the request has been handed to the agent. Response
    /// bytes arrive through the returned [`Connection`].
    async fn open(&self, request: &AgentRequest) -> Result<Connection, TransportError>;
}
