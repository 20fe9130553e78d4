//! Agent Client
//!
//! Entry point for surfaces: turns a user message plus a [`RequestContext`]
//! into a live [`ResponseStream`].
//!
//! # Example
//!
//! ```ignore
//! let client = AgentClient::from_config(&load_config()?).await?;
//! let ctx = RequestContext::for_thread("thread-42").with_token(token);
//! let mut stream = client.send("Summarise the logs", &ctx);
//! while let Some(chunk) = stream.next().await {
//!     println!("{}", chunk.to_json_line()?);
//! }
//! ```

use std::sync::Arc;

use crate::bus::EventBus;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::pipeline::StreamDecoder;
use crate::session::{ActiveThreadWatch, ThreadSessionStore};
use crate::streaming::{spawn_pump, PumpConfig, ResponseStream, StreamRegistry};
use crate::translator::ProtocolTranslator;
use crate::transport::{create_transport, AgentRequest, AgentTransport};

/// Everything about the caller that a request needs, captured once at
/// request-issue time
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Thread the message belongs to
    pub thread_id: Option<String>,
    /// Bearer token, if signed in
    pub auth_token: Option<String>,
}

impl RequestContext {
    /// Anonymous request outside any thread
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request for `thread_id`
    #[must_use]
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            auth_token: None,
        }
    }

    /// Snapshot the currently active thread
    #[must_use]
    pub fn from_active(active: &ActiveThreadWatch) -> Self {
        Self {
            thread_id: active.current(),
            auth_token: None,
        }
    }

    /// Attach a bearer token
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }
}

/// Issues requests to the agent and tracks their streams
///
/// Cheap to clone; clones share the transport, session store, bus and
/// stream registry.
#[derive(Clone)]
pub struct AgentClient {
    transport: Arc<dyn AgentTransport>,
    sessions: ThreadSessionStore,
    bus: Option<EventBus>,
    registry: StreamRegistry,
    pump: PumpConfig,
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("transport", &self.transport.name())
            .field("sessions", &self.sessions)
            .field("live_streams", &self.registry.len())
            .finish()
    }
}

impl AgentClient {
    /// Client over `transport` recording sessions in `sessions`
    #[must_use]
    pub fn new(transport: Arc<dyn AgentTransport>, sessions: ThreadSessionStore) -> Self {
        Self {
            transport,
            sessions,
            bus: None,
            registry: StreamRegistry::new(),
            pump: PumpConfig::default(),
        }
    }

    /// Build the transport and session store described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the transport
    /// cannot be built, or the session store file is unreadable.
    pub async fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let transport = create_transport(config)?;
        let sessions = match &config.session_store {
            Some(path) => ThreadSessionStore::open(path).await?,
            None => ThreadSessionStore::in_memory(),
        };
        Ok(Self::new(transport, sessions).with_pump_config(PumpConfig {
            channel_capacity: config.stream.channel_capacity,
            connect_timeout: config.stream.connect_timeout(),
        }))
    }

    /// Publish todo and canvas events on `bus`
    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Override per-response tuning
    #[must_use]
    pub fn with_pump_config(mut self, pump: PumpConfig) -> Self {
        self.pump = pump;
        self
    }

    /// Send a message and start streaming the response
    ///
    /// The session to resume is looked up for `ctx.thread_id`, and any
    /// session id the agent announces is bound to that same thread, even if
    /// the user has switched threads by the time it arrives.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn send(&self, content: impl Into<String>, ctx: &RequestContext) -> ResponseStream {
        let thread_id = ctx.thread_id.clone().filter(|t| !t.is_empty());
        let session_id = thread_id
            .as_deref()
            .and_then(|t| self.sessions.get_session_id(t));

        let request = AgentRequest::new(content)
            .with_token(ctx.auth_token.clone())
            .with_session_id(session_id);

        let mut translator = ProtocolTranslator::new();
        if let Some(thread) = &thread_id {
            translator = translator.with_session(self.sessions.clone(), thread.clone());
        }
        if let Some(bus) = &self.bus {
            translator = translator.with_bus(bus.clone());
        }

        tracing::debug!(
            thread_id = ?thread_id,
            resuming = request.session_id.is_some(),
            "Sending agent request"
        );

        spawn_pump(
            Arc::clone(&self.transport),
            request,
            StreamDecoder::new(translator),
            &self.pump,
            &self.registry,
            thread_id,
        )
    }

    /// Forget a thread: cancel its live responses and drop its session
    ///
    /// Returns the number of responses aborted.
    pub fn delete_thread(&self, thread_id: &str) -> usize {
        let aborted = self.registry.abort_thread(thread_id);
        self.sessions.remove_session_id(thread_id);
        tracing::info!(thread_id = %thread_id, aborted, "Deleted thread");
        aborted
    }

    /// Cancel every live response
    pub fn shutdown(&self) -> usize {
        let aborted = self.registry.abort_all();
        if aborted > 0 {
            tracing::info!(aborted, "Aborted live responses on shutdown");
        }
        aborted
    }

    /// Session bindings
    #[must_use]
    pub fn sessions(&self) -> &ThreadSessionStore {
        &self.sessions
    }

    /// Live responses
    #[must_use]
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Event bus, if attached
    #[must_use]
    pub fn bus(&self) -> Option<&EventBus> {
        self.bus.as_ref()
    }

    /// Name of the transport in use
    #[must_use]
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::UiChunk;
    use crate::session::ActiveThread;
    use crate::transport::InProcessTransport;

    #[test]
    fn test_context_from_active_thread() {
        let active = ActiveThread::new();
        active.set(Some("t1".to_string()));
        let ctx = RequestContext::from_active(&active.watch()).with_token(Some("tok".to_string()));
        assert_eq!(ctx.thread_id.as_deref(), Some("t1"));
        assert_eq!(ctx.auth_token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_send_attaches_stored_session() {
        let (transport, mut requests) = InProcessTransport::new_pair();
        let sessions = ThreadSessionStore::in_memory();
        sessions.set_session_id("t1", "S1");
        let client = AgentClient::new(Arc::new(transport), sessions);

        let stream = client.send(
            "hello",
            &RequestContext::for_thread("t1").with_token(Some("tok".to_string())),
        );
        let incoming = requests.recv().await.unwrap();
        assert_eq!(incoming.request.content, "hello");
        assert_eq!(incoming.request.session_id.as_deref(), Some("S1"));
        assert_eq!(incoming.request.token.as_deref(), Some("tok"));

        incoming.send_line(r#"{"type":"done"}"#).await;
        let chunks = stream.collect().await;
        assert_eq!(chunks.last(), Some(&UiChunk::Finish));
    }

    #[tokio::test]
    async fn test_send_without_thread_has_no_session() {
        let (transport, mut requests) = InProcessTransport::new_pair();
        let client = AgentClient::new(Arc::new(transport), ThreadSessionStore::in_memory());

        let stream = client.send("hello", &RequestContext::new());
        let incoming = requests.recv().await.unwrap();
        assert!(incoming.request.session_id.is_none());
        incoming
            .send_line(r#"{"type":"session_id","session_id":"S9"}"#)
            .await;
        drop(incoming);

        stream.collect().await;
        assert!(client.sessions().is_empty());
    }
}
