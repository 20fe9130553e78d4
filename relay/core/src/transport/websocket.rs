//! WebSocket Transport
//!
//! Opens a socket per request, sends the request as one JSON text message,
//! then forwards every inbound data message as bytes.
//!
//! # Message Boundaries
//!
//! Agents usually send one event per message without a trailing newline.
//! A newline is appended to any message that does not end with one, so a
//! message always completes at least one line. Ping/pong frames are ignored
//! and a close frame ends the stream normally.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use super::{AgentRequest, AgentTransport, Connection, TransportEvent, CONNECTION_BUFFER};
use crate::config::DEFAULT_WS_URL;
use crate::error::TransportError;

/// WebSocket connection to the agent
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    url: String,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(DEFAULT_WS_URL)
    }
}

impl WebSocketTransport {
    /// Create a transport for `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Endpoint URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Bytes to forward for one inbound message, newline-terminated
fn message_bytes(message: Message) -> Option<Vec<u8>> {
    let mut bytes = match message {
        Message::Text(text) => text.into_bytes(),
        Message::Binary(bytes) => bytes,
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => {
            return None
        }
    };
    if bytes.last() != Some(&b'\n') {
        bytes.push(b'\n');
    }
    Some(bytes)
}

#[async_trait]
impl AgentTransport for WebSocketTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn open(&self, request: &AgentRequest) -> Result<Connection, TransportError> {
        let mut handshake = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        if let Some(auth) = request.authorization() {
            let value = HeaderValue::from_str(&auth)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            handshake
                .headers_mut()
                .insert(tokio_tungstenite::tungstenite::http::header::AUTHORIZATION, value);
        }

        let (mut socket, _response) = tokio_tungstenite::connect_async(handshake).await?;
        tracing::debug!(url = %self.url, "WebSocket connected");

        let payload = serde_json::to_string(request)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        socket.send(Message::Text(payload)).await?;

        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        let reader = tokio::spawn(async move {
            while let Some(message) = socket.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        let _ = tx.send(TransportEvent::Error(e.into())).await;
                        return;
                    }
                };
                if message.is_close() {
                    tracing::debug!("WebSocket closed by agent");
                    break;
                }
                let Some(bytes) = message_bytes(message) else {
                    continue;
                };
                if tx.send(TransportEvent::Data(bytes)).await.is_err() {
                    break;
                }
            }
            let _ = socket.close(None).await;
        });

        Ok(Connection::new(rx, Some(reader)))
    }
}
