//! Response Pump
//!
//! The task that drives one response from connection to `finish`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use super::{AbortHandle, ResponseStream, StreamRegistry};
use crate::error::TransportError;
use crate::messages::UiChunk;
use crate::pipeline::StreamDecoder;
use crate::transport::{AgentRequest, AgentTransport, Connection, TransportEvent};

/// Per-response tuning
#[derive(Clone, Debug)]
pub struct PumpConfig {
    /// Downstream chunk buffer
    pub channel_capacity: usize,
    /// Bound on opening the connection (zero disables)
    pub connect_timeout: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Start a response in its own task
///
/// The stream is registered in `registry` until the pump exits.
pub fn spawn_pump(
    transport: Arc<dyn AgentTransport>,
    request: AgentRequest,
    mut decoder: StreamDecoder,
    config: &PumpConfig,
    registry: &StreamRegistry,
    thread_id: Option<String>,
) -> ResponseStream {
    let request_id = Uuid::new_v4();
    let abort = AbortHandle::new();
    decoder.set_abort(abort.clone());
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));

    registry.register(request_id, thread_id.clone(), abort.clone());

    let span = tracing::info_span!(
        "response",
        request_id = %request_id,
        thread_id = ?thread_id,
        transport = transport.name()
    );
    let pump = Pump {
        transport,
        decoder,
        tx,
        abort: abort.clone(),
        connect_timeout: config.connect_timeout,
    };
    let registry = registry.clone();
    tokio::spawn(
        async move {
            pump.run(request).await;
            registry.deregister(&request_id);
        }
        .instrument(span),
    );

    ResponseStream::new(request_id, thread_id, rx, abort)
}

struct Pump {
    transport: Arc<dyn AgentTransport>,
    decoder: StreamDecoder,
    tx: mpsc::Sender<UiChunk>,
    abort: AbortHandle,
    connect_timeout: Duration,
}

impl Pump {
    async fn run(mut self, request: AgentRequest) {
        let opened = tokio::select! {
            biased;
            () = self.abort.aborted() => {
                tracing::debug!("Aborted while connecting");
                return;
            }
            opened = self.open(&request) => opened,
        };

        let mut connection = match opened {
            Ok(connection) => {
                tracing::info!("Agent connection opened");
                connection
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open agent connection");
                let chunks = self.decoder.fail(&e.to_string());
                self.emit(chunks).await;
                return;
            }
        };

        loop {
            let event = tokio::select! {
                biased;
                () = self.abort.aborted() => {
                    tracing::debug!("Stream aborted");
                    connection.close();
                    return;
                }
                event = connection.next() => event,
            };
            if self.abort.is_aborted() {
                tracing::debug!("Stream aborted");
                connection.close();
                return;
            }

            let chunks = match event {
                Some(TransportEvent::Data(bytes)) => self.decoder.push(&bytes),
                Some(TransportEvent::Error(e)) => {
                    tracing::warn!(error = %e, "Agent connection failed");
                    self.decoder.fail(&e.to_string())
                }
                None => {
                    if !self.decoder.is_finished() {
                        tracing::debug!("Agent stream ended without done");
                    }
                    self.decoder.finish()
                }
            };

            if !self.emit(chunks).await {
                connection.close();
                return;
            }
            if self.decoder.is_finished() {
                break;
            }
        }

        connection.close();
        tracing::info!(
            dropped_lines = self.decoder.dropped_lines(),
            "Response complete"
        );
    }

    async fn open(&self, request: &AgentRequest) -> Result<Connection, TransportError> {
        if self.connect_timeout.is_zero() {
            return self.transport.open(request).await;
        }
        match tokio::time::timeout(self.connect_timeout, self.transport.open(request)).await {
            Ok(opened) => opened,
            Err(_) => Err(TransportError::Timeout(
                u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    /// Send chunks downstream unless aborted
    ///
    /// Returns `false` if the stream was aborted or the consumer went away.
    async fn emit(&self, chunks: Vec<UiChunk>) -> bool {
        for chunk in chunks {
            if self.abort.is_aborted() {
                return false;
            }
            let sent = tokio::select! {
                biased;
                () = self.abort.aborted() => return false,
                sent = self.tx.send(chunk) => sent,
            };
            if sent.is_err() {
                tracing::debug!("Response consumer dropped");
                return false;
            }
        }
        true
    }
}
