//! Response Streaming
//!
//! Each request runs in its own spawned task (the *pump*) that owns the
//! connection and the [`StreamDecoder`](crate::pipeline::StreamDecoder) for
//! that response. Downstream chunks flow to the caller over a bounded
//! channel.
//!
//! # Architecture
//!
//! ```text
//!  AgentClient::send()
//!         │
//!         ▼
//!  ┌──────────────────── pump task ───────────────────┐
//!  │ open ─► Connection ─► StreamDecoder ─► mpsc::Sender│──► ResponseStream
//!  │            ▲                                     │
//!  │            └──── AbortHandle (flag + Notify) ────│◄── abort()
//!  └──────────────────────────────────────────────────┘
//! ```
//!
//! # Termination
//!
//! - `done` (or a sentinel): the pump closes the connection and exits
//! - end of stream: forced completion (`finish-step`, `finish`)
//! - transport failure: one `error` chunk, then forced completion
//! - abort: nothing further is emitted, no completion is forced, and chunks
//!   already buffered for the consumer are discarded
//!
//! Finished streams deregister themselves from the [`StreamRegistry`].

mod abort;
mod pump;
mod registry;

pub use abort::AbortHandle;
pub use pump::{spawn_pump, PumpConfig};
pub use registry::{StreamInfo, StreamRegistry};

use futures::Stream;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::messages::UiChunk;

/// The downstream side of one response
#[derive(Debug)]
pub struct ResponseStream {
    request_id: Uuid,
    thread_id: Option<String>,
    chunks: mpsc::Receiver<UiChunk>,
    abort: AbortHandle,
}

impl ResponseStream {
    pub(crate) fn new(
        request_id: Uuid,
        thread_id: Option<String>,
        chunks: mpsc::Receiver<UiChunk>,
        abort: AbortHandle,
    ) -> Self {
        Self {
            request_id,
            thread_id,
            chunks,
            abort,
        }
    }

    /// Request identifier
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Thread the request was issued for
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Next chunk, or `None` when the response is over (or was aborted)
    ///
    /// Once aborted, nothing more is returned, including chunks the pump had
    /// already queued.
    pub async fn next(&mut self) -> Option<UiChunk> {
        let chunk = tokio::select! {
            biased;
            () = self.abort.aborted() => None,
            chunk = self.chunks.recv() => chunk,
        };
        if self.abort.is_aborted() {
            self.chunks.close();
            return None;
        }
        chunk
    }

    /// Handle that can cancel this response from elsewhere
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Cancel the response
    ///
    /// Idempotent; a no-op once the response has finished.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Drain every remaining chunk
    pub async fn collect(mut self) -> Vec<UiChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next().await {
            chunks.push(chunk);
        }
        chunks
    }

    /// Adapt into a `futures::Stream` with the same abort behaviour as
    /// [`next`](Self::next)
    ///
    /// Take an [`abort_handle`](Self::abort_handle) first if the caller may
    /// need to cancel.
    pub fn into_stream(self) -> impl Stream<Item = UiChunk> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let chunk = stream.next().await?;
            Some((chunk, stream))
        })
    }
}
