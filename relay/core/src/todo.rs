//! Todo Board
//!
//! Keeps the latest todo lists announced by the agent, fed from the
//! `todo_list_update` and `todo_item_update` bus topics.
//!
//! # Item Addressing
//!
//! `todo_update` events name their item with `item_id`. An id of the form
//! `todo_<n>` addresses the item at zero-based index `n`. Any other id, or an
//! index past the end of the list, falls back to the first item whose content
//! contains the id as a substring, ignoring case.
//!
//! When the update names a `list_id` the board knows, only that list is
//! touched; otherwise the update is applied to every list.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{BusEvent, EventBus, Topic};
use crate::upstream::lenient;

/// List id used when the agent does not name one
pub const DEFAULT_LIST_ID: &str = "default";

/// Prefix of index-style item ids
const INDEX_ID_PREFIX: &str = "todo_";

/// Status written when an update only carries `completed: true`
const COMPLETED_STATUS: &str = "completed";

/// One todo item as sent by the agent
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoEntry {
    /// Item text
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub content: String,
    /// `pending`, `in_progress`, `completed`, ...
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub status: String,
    /// Present-tense label shown while in progress
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub active_form: Option<String>,
    /// Fields this client does not interpret, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TodoEntry {
    /// Whether the item is done
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == COMPLETED_STATUS
    }

    fn apply(&mut self, update: &TodoItemUpdate) {
        self.status = update.resolved_status(&self.status);
        if let Some(text) = &update.text {
            self.content.clone_from(text);
        }
    }
}

/// A complete todo list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TodoList {
    /// List identifier
    pub list_id: String,
    /// List title
    #[serde(default)]
    pub title: Option<String>,
    /// Items in display order
    #[serde(default)]
    pub items: Vec<TodoEntry>,
}

impl TodoList {
    /// Number of completed items
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_completed()).count()
    }

    /// Index of the item `item_id` refers to
    #[must_use]
    pub fn locate(&self, item_id: &str) -> Option<usize> {
        if item_id.is_empty() {
            return None;
        }
        let by_index = item_id
            .strip_prefix(INDEX_ID_PREFIX)
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|&idx| idx < self.items.len());

        by_index.or_else(|| {
            let needle = item_id.to_lowercase();
            self.items
                .iter()
                .position(|item| item.content.to_lowercase().contains(&needle))
        })
    }
}

/// A change to one todo item
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoItemUpdate {
    /// List the item belongs to, if named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    /// Item address (see module docs)
    #[serde(default)]
    pub item_id: String,
    /// Completion flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    /// New status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Replacement text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl TodoItemUpdate {
    /// Status after applying this update to an item currently in `current`
    ///
    /// An explicit `status` wins; otherwise `completed: true` means
    /// `completed`; otherwise the status is unchanged.
    #[must_use]
    pub fn resolved_status(&self, current: &str) -> String {
        match (&self.status, self.completed) {
            (Some(status), _) if !status.is_empty() => status.clone(),
            (_, Some(true)) => COMPLETED_STATUS.to_string(),
            _ => current.to_string(),
        }
    }
}

/// Shared view of every todo list seen so far
#[derive(Clone)]
pub struct TodoBoard {
    lists: Arc<RwLock<Vec<TodoList>>>,
    version: Arc<watch::Sender<u64>>,
}

impl Default for TodoBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TodoBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoBoard")
            .field("lists", &self.lists.read().len())
            .field("version", &*self.version.borrow())
            .finish()
    }
}

impl TodoBoard {
    /// Create an empty board
    #[must_use]
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            lists: Arc::new(RwLock::new(Vec::new())),
            version: Arc::new(version),
        }
    }

    /// Replace (or add) a list wholesale
    pub fn apply_list(&self, list: TodoList) {
        {
            let mut lists = self.lists.write();
            match lists.iter_mut().find(|l| l.list_id == list.list_id) {
                Some(existing) => *existing = list,
                None => lists.push(list),
            }
        }
        self.bump();
    }

    /// Apply an item update
    ///
    /// Returns `true` if some item changed.
    pub fn apply_update(&self, update: &TodoItemUpdate) -> bool {
        let changed = {
            let mut lists = self.lists.write();
            let scope = update
                .list_id
                .as_deref()
                .filter(|id| lists.iter().any(|l| l.list_id == *id))
                .map(str::to_string);

            let mut changed = false;
            for list in lists
                .iter_mut()
                .filter(|l| scope.as_deref().map_or(true, |id| l.list_id == id))
            {
                if let Some(idx) = list.locate(&update.item_id) {
                    list.items[idx].apply(update);
                    changed = true;
                }
            }
            changed
        };

        if changed {
            self.bump();
        } else {
            tracing::debug!(item_id = %update.item_id, "Todo update matched no item");
        }
        changed
    }

    /// Snapshot of one list
    #[must_use]
    pub fn list(&self, list_id: &str) -> Option<TodoList> {
        self.lists.read().iter().find(|l| l.list_id == list_id).cloned()
    }

    /// Snapshot of every list, in arrival order
    #[must_use]
    pub fn lists(&self) -> Vec<TodoList> {
        self.lists.read().clone()
    }

    /// Drop every list
    pub fn clear(&self) {
        self.lists.write().clear();
        self.bump();
    }

    /// Receiver that is notified after every change
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Feed the board from `bus` until the bus goes away
    ///
    /// Subscriptions are taken before this returns, so events published
    /// afterwards are never missed.
    pub fn attach(&self, bus: &EventBus) -> JoinHandle<()> {
        let mut lists = bus.subscribe(Topic::TodoListUpdate);
        let mut items = bus.subscribe(Topic::TodoItemUpdate);
        let board = self.clone();

        tokio::spawn(async move {
            loop {
                // Lists first so an update never overtakes the list it targets
                let event = tokio::select! {
                    biased;
                    event = lists.recv() => event,
                    event = items.recv() => event,
                };
                match event {
                    Some(BusEvent::TodoList(list)) => board.apply_list(list),
                    Some(BusEvent::TodoItem(update)) => {
                        board.apply_update(&update);
                    }
                    Some(BusEvent::Canvas(_)) => {}
                    None => break,
                }
            }
            tracing::debug!("Todo board detached from bus");
        })
    }
}
