//! Transport Factory
//!
//! Builds the configured [`AgentTransport`] so callers never name a concrete
//! transport type.

use std::sync::Arc;

use super::{AgentTransport, HttpStreamTransport};
use crate::config::{RelayConfig, TransportKind};
use crate::error::TransportError;

/// Create the agent transport selected by `config`
///
/// # Errors
///
/// Returns `TransportError::InvalidRequest` if the WebSocket transport is
/// selected but the crate was built without the `websocket` feature, or if
/// the HTTP client cannot be built.
pub fn create_transport(config: &RelayConfig) -> Result<Arc<dyn AgentTransport>, TransportError> {
    match config.agent.transport {
        #[cfg(feature = "websocket")]
        TransportKind::Websocket => Ok(Arc::new(super::WebSocketTransport::new(
            config.agent.ws_url.clone(),
        ))),

        #[cfg(not(feature = "websocket"))]
        TransportKind::Websocket => Err(TransportError::InvalidRequest(
            "WebSocket transport not compiled in (enable the `websocket` feature)".into(),
        )),

        TransportKind::Http => Ok(Arc::new(HttpStreamTransport::new(
            config.agent.http_url.clone(),
            config.stream.connect_timeout(),
        )?)),
    }
}
