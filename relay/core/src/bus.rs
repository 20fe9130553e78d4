//! Event Bus
//!
//! Publish/subscribe channel with named topics, used to carry events from the
//! transport layer to UI widgets that are not part of the chunk stream (the
//! todo panel, the canvas).
//!
//! # Topics
//!
//! | Topic | Payload | Published for |
//! |-------|---------|---------------|
//! | `todo_list_update` | [`TodoList`] | `todo_list` |
//! | `todo_item_update` | [`TodoItemUpdate`] | `todo_update` |
//! | `use_canvas` | [`CanvasData`] | `use_canvas` |
//!
//! Each topic is a `tokio::sync::broadcast` channel. Subscribers that fall
//! behind lose the oldest events and are told how many they missed.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::todo::{TodoItemUpdate, TodoList};
use crate::upstream::CanvasData;

/// Default per-topic buffer
const DEFAULT_TOPIC_CAPACITY: usize = 64;

/// Named bus topic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Whole todo list replaced
    TodoListUpdate,
    /// Single todo item changed
    TodoItemUpdate,
    /// Canvas file created or modified
    UseCanvas,
}

impl Topic {
    /// All topics
    pub const ALL: [Topic; 3] = [Self::TodoListUpdate, Self::TodoItemUpdate, Self::UseCanvas];

    /// Topic name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TodoListUpdate => "todo_list_update",
            Self::TodoItemUpdate => "todo_item_update",
            Self::UseCanvas => "use_canvas",
        }
    }

    /// Look up a topic by name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload published on the bus
#[derive(Clone, Debug, PartialEq)]
pub enum BusEvent {
    /// Todo list snapshot
    TodoList(TodoList),
    /// Todo item change
    TodoItem(TodoItemUpdate),
    /// Canvas action
    Canvas(CanvasData),
}

impl BusEvent {
    /// The topic this payload belongs to
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::TodoList(_) => Topic::TodoListUpdate,
            Self::TodoItem(_) => Topic::TodoItemUpdate,
            Self::Canvas(_) => Topic::UseCanvas,
        }
    }
}

/// Cloneable handle to a set of broadcast topics
#[derive(Clone)]
pub struct EventBus {
    topics: Arc<DashMap<Topic, broadcast::Sender<BusEvent>>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.topics.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl EventBus {
    /// Create a bus with the default per-topic buffer
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a bus with a custom per-topic buffer
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, topic: Topic) -> broadcast::Sender<BusEvent> {
        self.topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish an event on its topic
    ///
    /// Returns the number of subscribers that will see it. Publishing to a
    /// topic nobody listens on is not an error.
    pub fn publish(&self, event: BusEvent) -> usize {
        let topic = event.topic();
        match self.sender(topic).send(event) {
            Ok(receivers) => {
                tracing::trace!(topic = %topic, receivers, "Published bus event");
                receivers
            }
            Err(_) => {
                tracing::trace!(topic = %topic, "Bus event had no subscribers");
                0
            }
        }
    }

    /// Subscribe to one topic
    #[must_use]
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        Subscription {
            topic,
            rx: self.sender(topic).subscribe(),
        }
    }

    /// Current subscriber count for a topic
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics
            .get(&topic)
            .map_or(0, |sender| sender.receiver_count())
    }
}

/// Receiving end of one topic
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    rx: broadcast::Receiver<BusEvent>,
}

impl Subscription {
    /// The subscribed topic
    #[must_use]
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Wait for the next event
    ///
    /// Returns `None` once every bus handle has been dropped.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(topic = %self.topic, missed, "Bus subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is ready (non-blocking)
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!(topic = %self.topic, missed, "Bus subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todo::TodoList;

    fn list(id: &str) -> TodoList {
        TodoList {
            list_id: id.to_string(),
            title: None,
            items: Vec::new(),
        }
    }

    #[test]
    fn test_topic_names_roundtrip() {
        for topic in Topic::ALL {
            assert_eq!(Topic::from_name(topic.name()), Some(topic));
        }
        assert_eq!(Topic::from_name("nope"), None);
        assert_eq!(Topic::TodoItemUpdate.to_string(), "todo_item_update");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(BusEvent::TodoList(list("a"))), 0);
    }

    #[test]
    fn test_subscribers_only_see_their_topic() {
        let bus = EventBus::new();
        let mut lists = bus.subscribe(Topic::TodoListUpdate);
        let mut items = bus.subscribe(Topic::TodoItemUpdate);

        assert_eq!(bus.publish(BusEvent::TodoList(list("a"))), 1);
        assert_eq!(lists.try_recv(), Some(BusEvent::TodoList(list("a"))));
        assert_eq!(items.try_recv(), None);
        assert_eq!(bus.subscriber_count(Topic::TodoListUpdate), 1);
    }

    #[test]
    fn test_lagged_subscriber_skips_ahead() {
        let bus = EventBus::with_capacity(2);
        let mut sub = bus.subscribe(Topic::TodoListUpdate);
        for id in ["a", "b", "c", "d"] {
            bus.publish(BusEvent::TodoList(list(id)));
        }
        assert_eq!(sub.try_recv(), Some(BusEvent::TodoList(list("c"))));
        assert_eq!(sub.try_recv(), Some(BusEvent::TodoList(list("d"))));
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn test_recv_ends_when_bus_dropped() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(Topic::UseCanvas);
        drop(bus);
        assert_eq!(sub.recv().await, None);
    }
}
