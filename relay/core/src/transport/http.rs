//! HTTP Streaming Transport
//!
//! POSTs the request as JSON and streams the response body back. The body is
//! newline-delimited JSON; SSE framing (`data: {...}`) works too since the
//! parser strips the field prefix.
//!
//! Headers:
//! - `Authorization: Bearer <token>` when a token is present
//! - `X-Session-ID: <id>` when the thread has a bound session

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::{AgentRequest, AgentTransport, Connection, TransportEvent, CONNECTION_BUFFER};
use crate::error::TransportError;

/// Header carrying the session to resume
pub const SESSION_HEADER: &str = "X-Session-ID";

/// Streaming HTTP connection to the agent
#[derive(Clone, Debug)]
pub struct HttpStreamTransport {
    url: String,
    http_client: reqwest::Client,
}

impl HttpStreamTransport {
    /// Create a transport posting to `url`
    ///
    /// Only connecting is bounded by `connect_timeout`; a response may
    /// stream for as long as the agent keeps talking.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http_client,
        })
    }

    /// Endpoint URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AgentTransport for HttpStreamTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(&self, request: &AgentRequest) -> Result<Connection, TransportError> {
        let mut builder = self.http_client.post(&self.url).json(request);
        if let Some(auth) = request.authorization() {
            builder = builder.header(reqwest::header::AUTHORIZATION, auth);
        }
        if let Some(session_id) = &request.session_id {
            builder = builder.header(SESSION_HEADER, session_id);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http { status, body });
        }

        tracing::debug!(url = %self.url, "HTTP stream opened");

        let mut stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);

        let reader = tokio::spawn(async move {
            while let Some(chunk) = stream.next().await {
                let event = match chunk {
                    Ok(bytes) => TransportEvent::Data(bytes.to_vec()),
                    Err(e) => {
                        let _ = tx.send(TransportEvent::Error(e.into())).await;
                        return;
                    }
                };
                if tx.send(event).await.is_err() {
                    // Connection closed by the client
                    return;
                }
            }
        });

        Ok(Connection::new(rx, Some(reader)))
    }
}
