//! Downstream Chunks
//!
//! The chunk protocol consumed by the message renderer. Every response is a
//! strictly ordered sequence:
//!
//! ```text
//! start, start-step, <content chunks...>, finish-step, finish
//! ```
//!
//! Text and reasoning content is bracketed by `*-start{id}` / `*-end{id}`
//! pairs. Tool, file, error and data chunks are atomic.
//!
//! The JSON shape matches the renderer exactly: kebab-case `type` tags and
//! camelCase field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One chunk of the downstream protocol
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiChunk {
    /// Response started
    Start,
    /// Step started
    StartStep,

    /// Text segment opened
    TextStart {
        /// Segment id (`text-N`)
        id: String,
    },
    /// Text appended to an open segment
    TextDelta {
        /// Segment id
        id: String,
        /// Appended text
        delta: String,
    },
    /// Text segment closed
    TextEnd {
        /// Segment id
        id: String,
    },

    /// Reasoning segment opened
    ReasoningStart {
        /// Segment id (`reasoning-N`)
        id: String,
    },
    /// Reasoning appended to an open segment
    ReasoningDelta {
        /// Segment id
        id: String,
        /// Appended text
        delta: String,
    },
    /// Reasoning segment closed
    ReasoningEnd {
        /// Segment id
        id: String,
    },

    /// Tool call with its complete input
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        /// Tool call id
        tool_call_id: String,
        /// Tool name
        tool_name: String,
        /// Tool input
        input: Value,
    },
    /// Tool call output
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable {
        /// Tool call id
        tool_call_id: String,
        /// Tool output
        output: Value,
    },
    /// Tool call failed
    #[serde(rename_all = "camelCase")]
    ToolOutputError {
        /// Tool call id
        tool_call_id: String,
        /// Failure description
        error_text: String,
    },

    /// File attachment
    #[serde(rename_all = "camelCase")]
    File {
        /// File location
        url: String,
        /// MIME type
        media_type: String,
    },

    /// Error shown to the user
    #[serde(rename_all = "camelCase")]
    Error {
        /// Error description
        error_text: String,
    },

    /// Todo list snapshot
    #[serde(rename = "data-todo_list")]
    DataTodoList {
        /// List id
        id: String,
        /// `{list_id, title, items}`
        data: Value,
    },
    /// Todo item change
    #[serde(rename = "data-todo_update")]
    DataTodoUpdate {
        /// List id
        id: String,
        /// `{list_id, item_id, completed, status, text}`
        data: Value,
    },

    /// Step finished
    FinishStep,
    /// Response finished
    Finish,
}

impl UiChunk {
    /// The wire `type` tag
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::StartStep => "start-step",
            Self::TextStart { .. } => "text-start",
            Self::TextDelta { .. } => "text-delta",
            Self::TextEnd { .. } => "text-end",
            Self::ReasoningStart { .. } => "reasoning-start",
            Self::ReasoningDelta { .. } => "reasoning-delta",
            Self::ReasoningEnd { .. } => "reasoning-end",
            Self::ToolInputAvailable { .. } => "tool-input-available",
            Self::ToolOutputAvailable { .. } => "tool-output-available",
            Self::ToolOutputError { .. } => "tool-output-error",
            Self::File { .. } => "file",
            Self::Error { .. } => "error",
            Self::DataTodoList { .. } => "data-todo_list",
            Self::DataTodoUpdate { .. } => "data-todo_update",
            Self::FinishStep => "finish-step",
            Self::Finish => "finish",
        }
    }

    /// Whether this chunk is part of the `start`/`finish` envelope
    #[must_use]
    pub fn is_envelope(&self) -> bool {
        matches!(
            self,
            Self::Start | Self::StartStep | Self::FinishStep | Self::Finish
        )
    }

    /// Whether this chunk is the last one of a response
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish)
    }

    /// Serialize to a single NDJSON line (no trailing newline)
    ///
    /// # Errors
    ///
    /// Returns an error if a payload `Value` cannot be serialized.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
