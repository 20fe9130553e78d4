//! Session Continuity
//!
//! The agent backend hands out a session id on the first response of a
//! conversation; sending it back on later requests resumes the same memory.
//! [`ThreadSessionStore`] keeps the `thread id → session id` bindings.
//!
//! # First Write Wins
//!
//! A thread's binding is set once. Later `session_id` events for the same
//! thread are ignored. Several streams may be in flight for different
//! threads at once, so every write is keyed by the thread that was active
//! when its request was issued (see [`ActiveThread`]).
//!
//! # Persistence
//!
//! A store opened with [`ThreadSessionStore::open`] mirrors its bindings to a
//! JSON object on disk (`{"<thread>": "<session>", ...}`). Changes are
//! synchronous in memory and written behind by a background task using
//! `tokio::fs`, so recording a session never blocks a stream. Writes go to a
//! sibling temp file which is then renamed over the original.
//! [`flush`](ThreadSessionStore::flush) waits for the current state to
//! reach disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{watch, Mutex, Notify};

use crate::error::SessionStoreError;

struct StoreInner {
    bindings: DashMap<String, String>,
    path: Option<PathBuf>,
    /// Bumped on every change
    version: AtomicU64,
    /// Version last written to disk; the lock serializes writers
    written: Mutex<u64>,
    /// Wakes the write-behind task
    dirty: Arc<Notify>,
}

impl StoreInner {
    fn new(bindings: DashMap<String, String>, path: Option<PathBuf>) -> Self {
        Self {
            bindings,
            path,
            version: AtomicU64::new(0),
            written: Mutex::new(0),
            dirty: Arc::new(Notify::new()),
        }
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.bindings
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    fn changed(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
        if self.path.is_some() {
            self.dirty.notify_one();
        }
    }

    /// Write the bindings unless disk already has this version
    async fn write(&self) -> Result<(), SessionStoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut written = self.written.lock().await;
        // Read before the snapshot so a racing change is written again later
        let version = self.version.load(Ordering::SeqCst);
        if *written >= version {
            return Ok(());
        }

        let io_err = |source: std::io::Error| SessionStoreError::Io {
            path: path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(&self.snapshot()).map_err(|source| {
            SessionStoreError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;

        *written = version;
        tracing::trace!(path = %path.display(), version, "Session store written");
        Ok(())
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        // Lets the write-behind task notice the store is gone
        self.dirty.notify_one();
    }
}

/// Persist changes until the store is dropped
async fn write_behind(store: Weak<StoreInner>, dirty: Arc<Notify>) {
    loop {
        dirty.notified().await;
        let Some(inner) = store.upgrade() else {
            break;
        };
        if let Err(e) = inner.write().await {
            tracing::warn!(error = %e, "Failed to persist session store");
        }
    }
    tracing::trace!("Session store writer stopped");
}

/// Thread → backend session bindings
///
/// Cheap to clone; clones share the same bindings.
#[derive(Clone)]
pub struct ThreadSessionStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for ThreadSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSessionStore")
            .field("bindings", &self.inner.bindings.len())
            .field("path", &self.inner.path)
            .finish()
    }
}

impl Default for ThreadSessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ThreadSessionStore {
    /// Store that lives only as long as the process
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner::new(DashMap::new(), None)),
        }
    }

    /// Open (or create) a store backed by `path`
    ///
    /// A missing or empty file yields an empty store; the file is created on
    /// first write. Starts the write-behind task, so this must run inside a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a
    /// JSON object of strings.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SessionStoreError> {
        let path = path.into();

        let bindings: DashMap<String, String> = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => DashMap::new(),
            Ok(contents) => {
                let stored: BTreeMap<String, String> = serde_json::from_str(&contents)
                    .map_err(|source| SessionStoreError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                stored.into_iter().collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DashMap::new(),
            Err(source) => return Err(SessionStoreError::Io { path, source }),
        };

        tracing::debug!(path = %path.display(), bindings = bindings.len(), "Opened session store");

        let inner = Arc::new(StoreInner::new(bindings, Some(path)));
        tokio::spawn(write_behind(
            Arc::downgrade(&inner),
            Arc::clone(&inner.dirty),
        ));
        Ok(Self { inner })
    }

    /// Backing file, if persistent
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Session bound to `thread_id`
    #[must_use]
    pub fn get_session_id(&self, thread_id: &str) -> Option<String> {
        self.inner.bindings.get(thread_id).map(|s| s.value().clone())
    }

    /// Bind `session_id` to `thread_id` unless the thread already has one
    ///
    /// Returns `true` if the binding was written. Empty ids are ignored.
    /// The disk write happens in the background; a failure there is logged
    /// and the in-memory binding still holds.
    pub fn set_session_id(&self, thread_id: &str, session_id: &str) -> bool {
        if thread_id.is_empty() || session_id.is_empty() {
            return false;
        }

        let inserted = match self.inner.bindings.entry(thread_id.to_string()) {
            Entry::Occupied(existing) => {
                if existing.get() != session_id {
                    tracing::debug!(
                        thread_id = %thread_id,
                        kept = %existing.get(),
                        ignored = %session_id,
                        "Thread already bound to a session"
                    );
                }
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(session_id.to_string());
                true
            }
        };

        if inserted {
            tracing::info!(thread_id = %thread_id, session_id = %session_id, "Bound thread to session");
            self.inner.changed();
        }
        inserted
    }

    /// Forget the binding for `thread_id`
    pub fn remove_session_id(&self, thread_id: &str) -> Option<String> {
        let removed = self.inner.bindings.remove(thread_id).map(|(_, s)| s);
        if removed.is_some() {
            tracing::debug!(thread_id = %thread_id, "Removed session binding");
            self.inner.changed();
        }
        removed
    }

    /// Forget every binding
    pub fn clear_all(&self) {
        self.inner.bindings.clear();
        self.inner.changed();
    }

    /// All bindings, sorted by thread id
    #[must_use]
    pub fn list(&self) -> Vec<(String, String)> {
        self.inner.snapshot().into_iter().collect()
    }

    /// Number of bindings
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.bindings.len()
    }

    /// Whether there are no bindings
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.bindings.is_empty()
    }

    /// Wait until the current bindings are on disk
    ///
    /// No-op for in-memory stores and when nothing changed since the last
    /// write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its directory cannot be written.
    pub async fn flush(&self) -> Result<(), SessionStoreError> {
        self.inner.write().await
    }
}

/// The thread the user is currently looking at
///
/// Explicit shared state with a single writer: whoever owns the
/// `ActiveThread` (the surface's thread controller) is the only one that
/// changes it. Everyone else holds an [`ActiveThreadWatch`].
///
/// Request code must not consult this while a response is streaming.
/// Snapshot it once into a [`RequestContext`](crate::client::RequestContext)
/// when the request is issued.
#[derive(Debug)]
pub struct ActiveThread {
    tx: watch::Sender<Option<String>>,
}

impl Default for ActiveThread {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveThread {
    /// No thread selected
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Select a thread (or none)
    pub fn set(&self, thread_id: Option<String>) {
        tracing::debug!(thread_id = ?thread_id, "Active thread changed");
        self.tx.send_replace(thread_id);
    }

    /// Currently selected thread
    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Read-only handle
    #[must_use]
    pub fn watch(&self) -> ActiveThreadWatch {
        ActiveThreadWatch {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only view of [`ActiveThread`]
#[derive(Clone, Debug)]
pub struct ActiveThreadWatch {
    rx: watch::Receiver<Option<String>>,
}

impl ActiveThreadWatch {
    /// Currently selected thread
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Wait for the selection to change
    ///
    /// Returns `None` once the owning [`ActiveThread`] is dropped.
    pub async fn changed(&mut self) -> Option<Option<String>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
