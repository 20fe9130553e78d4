//! Upstream Events
//!
//! Events received from the agent backend, one JSON object per line,
//! discriminated by a `type` field.
//!
//! # Tolerance
//!
//! The upstream stream is not trusted to be well-formed. [`parse_line`]
//! never fails: a line that is not a JSON object is dropped and the stream
//! carries on. An object is accepted on its `type` alone. A field of the
//! wrong JSON type (a numeric `id`, a `null` `content`) falls back to its
//! default instead of rejecting the event. Objects with a `type` this module
//! does not know become [`UpstreamEvent::Unknown`] so their string `content`
//! can still be shown as plain text.
//!
//! # Completion Sentinels
//!
//! Besides `{"type":"done"}`, two legacy forms also mean "response complete":
//! a bare `[DONE]` line, and `{"type":"chunk","content":"[DONE]"}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::todo::{TodoEntry, TodoItemUpdate, TodoList};

/// Legacy completion sentinel
pub const DONE_SENTINEL: &str = "[DONE]";

/// Server-sent-events field prefix accepted in front of a JSON record
const SSE_DATA_PREFIX: &str = "data:";

/// Field deserializers that fall back instead of failing
pub(crate) mod lenient {
    use serde::de::{DeserializeOwned, Deserializer};
    use serde::Deserialize;
    use serde_json::Value;

    /// `T` if the value fits, else `T::default()`
    pub(crate) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    /// Identifier sent as a string or a number
    pub(crate) fn id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Like [`id`], empty when absent
    pub(crate) fn id_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(id(deserializer)?.unwrap_or_default())
    }
}

/// Correlation fields carried by every event except `session_id`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event identifier
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: Option<String>,
    /// Backend session identifier
    #[serde(default, deserialize_with = "lenient::id")]
    pub session_id: Option<String>,
    /// Backend conversation identifier
    #[serde(default, deserialize_with = "lenient::id")]
    pub conversation_id: Option<String>,
    /// `assistant` or `system`
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub role: Option<String>,
}

/// `text_delta` and `text` payload
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TextEvent {
    /// Correlation envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Text content
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub content: String,
}

/// Reasoning sub-state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningStatus {
    /// More reasoning follows
    Thinking,
    /// Reasoning span is complete
    Done,
    /// Any status this client does not understand
    #[serde(other)]
    Other,
}

/// `reasoning` payload
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ReasoningEvent {
    /// Correlation envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Reasoning text (may be empty on `done`)
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub content: String,
    /// Sub-state
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub status: Option<ReasoningStatus>,
}

/// `tool_use` payload
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ToolUseEvent {
    /// Correlation envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Tool call identifier
    #[serde(default, deserialize_with = "lenient::id_or_empty")]
    pub tool_use_id: String,
    /// Tool name
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        rename = "toolName",
        alias = "tool_name"
    )]
    pub tool_name: String,
    /// Tool arguments, forwarded verbatim
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub args: Value,
}

/// Outcome of a tool call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultStatus {
    /// Tool finished successfully
    Completed,
    /// Tool failed
    Error,
    /// Any status this client does not understand
    #[serde(other)]
    Other,
}

/// `tool_result` payload
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ToolResultEvent {
    /// Correlation envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Tool call identifier this result belongs to
    #[serde(default, deserialize_with = "lenient::id_or_empty")]
    pub tool_use_id: String,
    /// Tool name
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        rename = "toolName",
        alias = "tool_name"
    )]
    pub tool_name: Option<String>,
    /// Tool output, forwarded verbatim
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub result: Value,
    /// Outcome
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub status: Option<ToolResultStatus>,
    /// Error text when `status` is `error`
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub error: Option<String>,
}

/// Body of a `todo_list` event when nested under `data`
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TodoListBody {
    /// List identifier
    #[serde(default, deserialize_with = "lenient::id")]
    pub list_id: Option<String>,
    /// List title
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub title: Option<String>,
    /// List items
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub items: Option<Vec<TodoEntry>>,
}

/// `todo_list` payload
///
/// Backends put `list_id`, `title` and `items` either at the top level or
/// under `data`; top-level values win.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TodoListEvent {
    /// Correlation envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// List identifier
    #[serde(default, deserialize_with = "lenient::id")]
    pub list_id: Option<String>,
    /// List title
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub title: Option<String>,
    /// List items
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub items: Option<Vec<TodoEntry>>,
    /// Nested form
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub data: Option<TodoListBody>,
}

impl TodoListEvent {
    /// Resolve top-level and nested fields into one list
    #[must_use]
    pub fn to_list(&self) -> TodoList {
        let nested = self.data.clone().unwrap_or_default();
        TodoList {
            list_id: self
                .list_id
                .clone()
                .or(nested.list_id)
                .unwrap_or_else(|| crate::todo::DEFAULT_LIST_ID.to_string()),
            title: self.title.clone().or(nested.title),
            items: self.items.clone().or(nested.items).unwrap_or_default(),
        }
    }
}

/// Body of a `todo_update` event when nested under `data`
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TodoUpdateBody {
    /// List identifier
    #[serde(default, deserialize_with = "lenient::id")]
    pub list_id: Option<String>,
    /// Item address
    #[serde(default, deserialize_with = "lenient::id")]
    pub item_id: Option<String>,
    /// Completion flag
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub completed: Option<bool>,
    /// New status
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub status: Option<String>,
    /// Replacement text
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub text: Option<String>,
}

/// `todo_update` payload
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TodoUpdateEvent {
    /// Correlation envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Top-level fields
    #[serde(flatten)]
    pub fields: TodoUpdateBody,
    /// Nested form
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub data: Option<TodoUpdateBody>,
}

impl TodoUpdateEvent {
    /// Resolve top-level and nested fields into one update
    #[must_use]
    pub fn to_update(&self) -> TodoItemUpdate {
        let nested = self.data.clone().unwrap_or_default();
        let top = self.fields.clone();
        TodoItemUpdate {
            list_id: top.list_id.or(nested.list_id),
            item_id: top.item_id.or(nested.item_id).unwrap_or_default(),
            completed: top.completed.or(nested.completed),
            status: top.status.or(nested.status),
            text: top.text.or(nested.text),
        }
    }
}

/// `image` payload
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ImageEvent {
    /// Correlation envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Image location
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub url: String,
    /// Alternative text
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub alt: Option<String>,
    /// MIME type
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        rename = "mediaType",
        alias = "media_type"
    )]
    pub media_type: String,
}

/// `error` payload
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ErrorEvent {
    /// Correlation envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Error message
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub error: Option<String>,
    /// Backend error code
    #[serde(default, deserialize_with = "lenient::id")]
    pub code: Option<String>,
}

/// `session_id` payload (no envelope)
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SessionIdEvent {
    /// Backend session identifier
    #[serde(default, deserialize_with = "lenient::id")]
    pub session_id: Option<String>,
    /// Older backends put the identifier here
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: Option<String>,
    /// Backend conversation identifier
    #[serde(default, deserialize_with = "lenient::id")]
    pub conversation_id: Option<String>,
}

impl SessionIdEvent {
    /// The session identifier, if a non-empty one was sent
    #[must_use]
    pub fn resolved_id(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.id.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Sub-agent invocation details
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SubAgentData {
    /// Sub-agent name
    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        rename = "agentName",
        alias = "agent_name"
    )]
    pub agent_name: String,
    /// Sub-agent instance identifier
    #[serde(
        default,
        deserialize_with = "lenient::id_or_empty",
        rename = "subAgentId",
        alias = "sub_agent_id"
    )]
    pub sub_agent_id: String,
    /// Prompt handed to the sub-agent
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub prompt: String,
    /// Status message
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub message: String,
}

/// `sub_agent` payload
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SubAgentEvent {
    /// Correlation envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Tool call identifier used to pair with `sub_agent_end`
    #[serde(default, deserialize_with = "lenient::id")]
    pub tool_use_id: Option<String>,
    /// Invocation details
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub data: SubAgentData,
}

impl SubAgentEvent {
    /// Tool call id, falling back to the sub-agent id
    #[must_use]
    pub fn call_id(&self) -> &str {
        self.tool_use_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.data.sub_agent_id)
    }
}

/// Sub-agent completion details
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SubAgentEndData {
    /// Closing message
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub message: String,
}

/// `sub_agent_end` payload
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SubAgentEndEvent {
    /// Correlation envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Tool call identifier of the matching `sub_agent`
    #[serde(default, deserialize_with = "lenient::id_or_empty")]
    pub tool_use_id: String,
    /// Completion details
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub data: SubAgentEndData,
}

/// Canvas file action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasAction {
    /// Open a new canvas
    Create,
    /// Update an open canvas
    Modify,
}

/// Canvas event details
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanvasData {
    /// What to do with the file
    pub action: CanvasAction,
    /// File descriptor, forwarded verbatim
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub file: Value,
    /// Status message
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub message: String,
}

/// `use_canvas` payload
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CanvasEvent {
    /// Correlation envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Canvas details
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub data: Option<CanvasData>,
}

/// One event from the agent backend
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamEvent {
    /// Incremental text
    TextDelta(TextEvent),
    /// Complete, self-contained text block
    Text(TextEvent),
    /// Reasoning text
    Reasoning(ReasoningEvent),
    /// Tool invocation
    ToolUse(ToolUseEvent),
    /// Tool outcome
    ToolResult(ToolResultEvent),
    /// Full todo list
    TodoList(TodoListEvent),
    /// Single todo item change
    TodoUpdate(TodoUpdateEvent),
    /// Image attachment
    Image(ImageEvent),
    /// Backend-reported error
    Error(ErrorEvent),
    /// End of response
    Done(Envelope),
    /// Backend session identifier for continuity
    SessionId(SessionIdEvent),
    /// Sub-agent started
    SubAgent(SubAgentEvent),
    /// Sub-agent finished
    SubAgentEnd(SubAgentEndEvent),
    /// Canvas file created or modified
    UseCanvas(CanvasEvent),
    /// Any other `type`; string `content` is kept as plain text
    #[serde(skip)]
    Unknown {
        /// The unrecognised `type` value
        kind: String,
        /// String `content`, if any
        content: Option<String>,
    },
}

impl UpstreamEvent {
    /// A `done` event with an empty envelope
    #[must_use]
    pub fn done() -> Self {
        Self::Done(Envelope::default())
    }

    /// Whether this event ends the response
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Wire name of the event type, for logging
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::TextDelta(_) => "text_delta",
            Self::Text(_) => "text",
            Self::Reasoning(_) => "reasoning",
            Self::ToolUse(_) => "tool_use",
            Self::ToolResult(_) => "tool_result",
            Self::TodoList(_) => "todo_list",
            Self::TodoUpdate(_) => "todo_update",
            Self::Image(_) => "image",
            Self::Error(_) => "error",
            Self::Done(_) => "done",
            Self::SessionId(_) => "session_id",
            Self::SubAgent(_) => "sub_agent",
            Self::SubAgentEnd(_) => "sub_agent_end",
            Self::UseCanvas(_) => "use_canvas",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

/// `type` values that deserialize into a typed variant
const KNOWN_TYPES: &[&str] = &[
    "text_delta",
    "text",
    "reasoning",
    "tool_use",
    "tool_result",
    "todo_list",
    "todo_update",
    "image",
    "error",
    "done",
    "session_id",
    "sub_agent",
    "sub_agent_end",
    "use_canvas",
];

/// Parse one line of the upstream stream
///
/// Returns `None` for blank lines and anything malformed.
#[must_use]
pub fn parse_line(line: &str) -> Option<UpstreamEvent> {
    let mut record = line.trim();
    if let Some(rest) = record.strip_prefix(SSE_DATA_PREFIX) {
        record = rest.trim_start();
    }

    if record.is_empty() {
        return None;
    }
    if record == DONE_SENTINEL {
        return Some(UpstreamEvent::done());
    }

    let value: Value = match serde_json::from_str(record) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping non-JSON upstream line");
            return None;
        }
    };

    let Value::Object(ref object) = value else {
        tracing::debug!("Dropping non-object upstream line");
        return None;
    };

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let content = object
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    if kind == "chunk" {
        return match content.as_deref() {
            Some(DONE_SENTINEL) => Some(UpstreamEvent::done()),
            _ => Some(UpstreamEvent::Unknown { kind, content }),
        };
    }

    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Some(UpstreamEvent::Unknown { kind, content });
    }

    match serde_json::from_value(value) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(kind = %kind, error = %e, "Dropping malformed upstream event");
            None
        }
    }
}
