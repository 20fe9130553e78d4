//! Abort Primitive

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
}

/// Cancels one response stream
///
/// Cloneable; every clone controls the same stream. The flag is checked
/// before every downstream emission, and the pump waits on the notifier so
/// an abort also interrupts a connection that never delivers anything.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle {
    inner: Arc<AbortState>,
}

impl AbortHandle {
    /// New, not aborted
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the stream
    ///
    /// Returns `true` for the call that actually aborted; later calls are
    /// no-ops and return `false`.
    pub fn abort(&self) -> bool {
        let first = !self.inner.aborted.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Whether abort has been requested
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once the stream is aborted
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Registered before the flag check so a concurrent abort cannot be missed
            notified.as_mut().enable();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}
