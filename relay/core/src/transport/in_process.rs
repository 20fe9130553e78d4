//! In-Process Transport
//!
//! Channel-based agent connection for embedded mode: the "agent" lives in
//! the same process and answers requests through [`IncomingRequest`].
//! Tests use it to script upstream byte streams exactly.
//!
//! # Usage
//!
//! ```ignore
//! let (transport, mut requests) = InProcessTransport::new_pair();
//!
//! tokio::spawn(async move {
//!     while let Some(incoming) = requests.recv().await {
//!         incoming.send_line(r#"{"type":"text","content":"hi"}"#).await;
//!         incoming.send_line(r#"{"type":"done"}"#).await;
//!         // dropping `incoming` ends the stream
//!     }
//! });
//! ```

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{AgentRequest, AgentTransport, Connection, TransportEvent, CONNECTION_BUFFER};
use crate::error::TransportError;

/// A request waiting for the in-process agent to answer
#[derive(Debug)]
pub struct IncomingRequest {
    /// The request as sent by the client
    pub request: AgentRequest,
    replies: mpsc::Sender<TransportEvent>,
}

impl IncomingRequest {
    /// Send raw bytes
    ///
    /// Returns `false` once the client has closed the connection.
    pub async fn send_bytes(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.replies
            .send(TransportEvent::Data(bytes.into()))
            .await
            .is_ok()
    }

    /// Send one record followed by a newline
    pub async fn send_line(&self, line: &str) -> bool {
        self.send_bytes(format!("{line}\n")).await
    }

    /// Fail the connection
    pub async fn fail(self, error: TransportError) {
        let _ = self.replies.send(TransportEvent::Error(error)).await;
    }

    /// Whether the client has gone away
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.replies.is_closed()
    }

    /// Wait until the client closes the connection
    pub async fn closed(&self) {
        self.replies.closed().await;
    }
}

/// Client side of the in-process agent
#[derive(Clone, Debug)]
pub struct InProcessTransport {
    requests: mpsc::Sender<IncomingRequest>,
}

impl InProcessTransport {
    /// Create a transport and the receiver the embedded agent reads from
    #[must_use]
    pub fn new_pair() -> (Self, mpsc::Receiver<IncomingRequest>) {
        let (requests, rx) = mpsc::channel(CONNECTION_BUFFER);
        (Self { requests }, rx)
    }
}

#[async_trait]
impl AgentTransport for InProcessTransport {
    fn name(&self) -> &'static str {
        "in-process"
    }

    async fn open(&self, request: &AgentRequest) -> Result<Connection, TransportError> {
        let (replies, events) = mpsc::channel(CONNECTION_BUFFER);
        self.requests
            .send(IncomingRequest {
                request: request.clone(),
                replies,
            })
            .await
            .map_err(|_| TransportError::ConnectionFailed("in-process agent is gone".to_string()))?;
        Ok(Connection::new(events, None))
    }
}
