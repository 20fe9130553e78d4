//! Relay Core - Streaming Protocol Translation for agent-relay
//!
//! This crate sits between an agent backend that streams line-delimited JSON
//! events and a message renderer that expects a strictly ordered chunk
//! protocol. It owns the connection, reassembles lines across arbitrary
//! transport chunks, and re-encodes the event stream incrementally.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Surfaces (CLI, ...)                       │
//! │        RequestContext { thread_id, auth_token }  ▲ UiChunk        │
//! └───────────────────────────┬──────────────────────┼────────────────┘
//!                             │                      │
//! ┌───────────────────────────┼──────────────────────┼────────────────┐
//! │                      RELAY CORE                  │                │
//! │  AgentClient ──► pump task ─────────────────────►│                │
//! │                     │                                             │
//! │   Transport ──► LineDecoder ──► parse_line ──► ProtocolTranslator │
//! │  (WebSocket /                                    │      │         │
//! │   HTTP stream)                    ThreadSessionStore  EventBus    │
//! │                                   (session_id)      (todo, canvas)│
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`AgentClient`]: issues requests and hands back [`ResponseStream`]s
//! - [`UpstreamEvent`]: one event from the agent backend
//! - [`UiChunk`]: one chunk of the renderer protocol
//! - [`ProtocolTranslator`]: the per-response state machine
//! - [`ThreadSessionStore`]: thread → backend session bindings
//! - [`EventBus`]: named pub/sub topics for the todo panel and canvas
//!
//! # Module Overview
//!
//! - [`transport`]: agent connections and line framing
//! - [`upstream`]: upstream event types and the line parser
//! - [`messages`]: downstream chunk types
//! - [`translator`]: upstream → downstream state machine
//! - [`pipeline`]: framer + parser + translator for one response
//! - [`streaming`]: response pump, abort handle, live stream registry
//! - [`session`]: session continuity store and active thread tracker
//! - [`client`]: request construction
//! - [`bus`]: publish/subscribe topics
//! - [`todo`]: todo board fed from the bus
//! - [`config`]: TOML and environment configuration
//! - [`error`]: error types
//!
//! # No UI Dependencies
//!
//! Nothing here renders anything. Surfaces consume [`UiChunk`]s however they
//! like.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod client;
pub mod config;
pub mod error;
pub mod messages;
pub mod pipeline;
pub mod session;
pub mod streaming;
pub mod todo;
pub mod translator;
pub mod transport;
pub mod upstream;

// Re-exports for convenience
pub use bus::{BusEvent, EventBus, Subscription, Topic};
pub use client::{AgentClient, RequestContext};
pub use config::{
    load_config, load_config_from_path, ConfigError, ConfigOverrides, ConfigSource, RelayConfig,
    TransportKind,
};
pub use error::{RelayError, SessionStoreError, TransportError};
pub use messages::UiChunk;
pub use pipeline::StreamDecoder;
pub use session::{ActiveThread, ActiveThreadWatch, ThreadSessionStore};
pub use streaming::{AbortHandle, ResponseStream, StreamRegistry};
pub use todo::{TodoBoard, TodoEntry, TodoItemUpdate, TodoList};
pub use translator::ProtocolTranslator;
pub use transport::{AgentRequest, AgentTransport, Connection, TransportEvent};
pub use upstream::{parse_line, UpstreamEvent};
