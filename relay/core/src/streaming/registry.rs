//! Live Stream Registry
//!
//! Tracks every in-flight response by request id so a thread deletion or a
//! shutdown can cancel them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use super::AbortHandle;

/// One registered stream
#[derive(Clone, Debug)]
pub struct StreamInfo {
    /// Thread the request was issued for
    pub thread_id: Option<String>,
    /// Cancels the stream
    pub abort: AbortHandle,
    /// When the request was issued
    pub started_at: Instant,
}

impl StreamInfo {
    /// Time since the request was issued
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Shared map of live streams
#[derive(Clone, Debug, Default)]
pub struct StreamRegistry {
    streams: Arc<DashMap<Uuid, StreamInfo>>,
}

impl StreamRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new stream
    pub fn register(&self, request_id: Uuid, thread_id: Option<String>, abort: AbortHandle) {
        self.streams.insert(
            request_id,
            StreamInfo {
                thread_id,
                abort,
                started_at: Instant::now(),
            },
        );
    }

    /// Stop tracking a stream
    pub fn deregister(&self, request_id: &Uuid) -> Option<StreamInfo> {
        self.streams.remove(request_id).map(|(_, info)| info)
    }

    /// Abort one stream
    ///
    /// Returns `false` if the stream is not live.
    pub fn abort(&self, request_id: &Uuid) -> bool {
        match self.deregister(request_id) {
            Some(info) => {
                info.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every stream issued for `thread_id`
    ///
    /// Returns how many were aborted.
    pub fn abort_thread(&self, thread_id: &str) -> usize {
        let ids: Vec<Uuid> = self
            .streams
            .iter()
            .filter(|e| e.value().thread_id.as_deref() == Some(thread_id))
            .map(|e| *e.key())
            .collect();
        ids.iter().filter(|id| self.abort(id)).count()
    }

    /// Abort every stream
    pub fn abort_all(&self) -> usize {
        let ids: Vec<Uuid> = self.streams.iter().map(|e| *e.key()).collect();
        ids.iter().filter(|id| self.abort(id)).count()
    }

    /// Live request ids for `thread_id`
    #[must_use]
    pub fn streams_for_thread(&self, thread_id: &str) -> Vec<Uuid> {
        self.streams
            .iter()
            .filter(|e| e.value().thread_id.as_deref() == Some(thread_id))
            .map(|e| *e.key())
            .collect()
    }

    /// Number of live streams
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether no stream is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
