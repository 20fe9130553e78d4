//! Protocol Translator
//!
//! State machine that turns the upstream event sequence of one response into
//! a well-formed downstream chunk sequence.
//!
//! # Output Shape
//!
//! ```text
//! start
//! start-step
//!   text-start{text-0}  text-delta{text-0}...  text-end{text-0}
//!   reasoning-start{reasoning-0}  reasoning-delta...  reasoning-end
//!   tool-input-available / tool-output-* / file / error / data-*
//! finish-step
//! finish
//! ```
//!
//! - `start` and `start-step` are emitted once, before the output of the
//!   first event (whatever its type).
//! - At most one text and one reasoning segment are open at a time. Ids come
//!   from per-kind counters and are never reused within a response.
//! - `done`, [`finish`](ProtocolTranslator::finish) and
//!   [`fail`](ProtocolTranslator::fail) close open segments (text first, then
//!   reasoning) and emit `finish-step`, `finish`. After that the translator
//!   ignores everything.
//!
//! # Side Channels
//!
//! `session_id` events are written to the [`ThreadSessionStore`] for the
//! thread captured when the request was issued. `todo_list`, `todo_update`
//! and `use_canvas` events are published on the [`EventBus`] when one is
//! attached. Once the response's [`AbortHandle`] fires, neither happens.

use serde_json::json;

use crate::bus::{BusEvent, EventBus};
use crate::messages::UiChunk;
use crate::session::ThreadSessionStore;
use crate::streaming::AbortHandle;
use crate::todo::DEFAULT_LIST_ID;
use crate::upstream::{
    ReasoningEvent, ReasoningStatus, SessionIdEvent, SubAgentEndEvent, SubAgentEvent,
    ToolResultEvent, ToolResultStatus, UpstreamEvent,
};

/// Error text for a failed tool call that carried no message
pub const DEFAULT_TOOL_ERROR: &str = "Tool execution failed";

/// Error text for an `error` event that carried no message
pub const DEFAULT_ERROR: &str = "Unknown error";

/// Media type for an `image` event that carried none
const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

/// Tool name prefix for sub-agent invocations
const SUB_AGENT_TOOL_PREFIX: &str = "SubAgent:";

/// Where `session_id` events for this response are recorded
#[derive(Clone, Debug)]
struct SessionBinding {
    store: ThreadSessionStore,
    thread_id: String,
}

/// Per-response translation state
#[derive(Debug, Default)]
pub struct ProtocolTranslator {
    emitted_start: bool,
    finished: bool,
    /// Id of the open text segment
    open_text: Option<String>,
    /// Id of the open reasoning segment
    open_reasoning: Option<String>,
    text_counter: u32,
    reasoning_counter: u32,
    binding: Option<SessionBinding>,
    bus: Option<EventBus>,
    abort: Option<AbortHandle>,
}

impl ProtocolTranslator {
    /// Translator with no side channels
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `session_id` events against `thread_id`
    #[must_use]
    pub fn with_session(mut self, store: ThreadSessionStore, thread_id: impl Into<String>) -> Self {
        self.binding = Some(SessionBinding {
            store,
            thread_id: thread_id.into(),
        });
        self
    }

    /// Publish todo and canvas events on `bus`
    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Stop side effects once `abort` fires
    #[must_use]
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    pub(crate) fn set_abort(&mut self, abort: AbortHandle) {
        self.abort = Some(abort);
    }

    /// Whether `start` has been emitted
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.emitted_start
    }

    /// Whether `finish` has been emitted
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Translate one upstream event
    pub fn translate(&mut self, event: UpstreamEvent) -> Vec<UiChunk> {
        if self.finished {
            tracing::trace!(kind = %event.kind(), "Ignoring event after finish");
            return Vec::new();
        }

        let mut out = Vec::new();
        self.ensure_started(&mut out);

        match event {
            UpstreamEvent::TextDelta(event) => self.text_delta(event.content, &mut out),
            UpstreamEvent::Text(event) => {
                let id = self.next_text_id();
                out.push(UiChunk::TextStart { id: id.clone() });
                out.push(UiChunk::TextDelta {
                    id: id.clone(),
                    delta: event.content,
                });
                out.push(UiChunk::TextEnd { id });
            }
            UpstreamEvent::Reasoning(event) => self.reasoning(event, &mut out),
            UpstreamEvent::ToolUse(event) => out.push(UiChunk::ToolInputAvailable {
                tool_call_id: event.tool_use_id,
                tool_name: event.tool_name,
                input: event.args,
            }),
            UpstreamEvent::ToolResult(event) => out.push(tool_result(event)),
            UpstreamEvent::SubAgent(event) => out.push(sub_agent_start(&event)),
            UpstreamEvent::SubAgentEnd(event) => out.push(sub_agent_end(event)),
            UpstreamEvent::TodoList(event) => {
                let list = event.to_list();
                out.push(UiChunk::DataTodoList {
                    id: list.list_id.clone(),
                    data: serde_json::to_value(&list).unwrap_or_default(),
                });
                self.publish(BusEvent::TodoList(list));
            }
            UpstreamEvent::TodoUpdate(event) => {
                let update = event.to_update();
                out.push(UiChunk::DataTodoUpdate {
                    id: update
                        .list_id
                        .clone()
                        .unwrap_or_else(|| DEFAULT_LIST_ID.to_string()),
                    data: serde_json::to_value(&update).unwrap_or_default(),
                });
                self.publish(BusEvent::TodoItem(update));
            }
            UpstreamEvent::Image(event) => out.push(UiChunk::File {
                url: event.url,
                media_type: if event.media_type.is_empty() {
                    DEFAULT_IMAGE_MEDIA_TYPE.to_string()
                } else {
                    event.media_type
                },
            }),
            UpstreamEvent::Error(event) => {
                if let Some(code) = &event.code {
                    tracing::debug!(code = %code, "Agent reported error");
                }
                out.push(UiChunk::Error {
                    error_text: event
                        .error
                        .filter(|e| !e.is_empty())
                        .unwrap_or_else(|| DEFAULT_ERROR.to_string()),
                });
            }
            UpstreamEvent::SessionId(event) => self.bind_session(&event),
            UpstreamEvent::UseCanvas(event) => match event.data {
                Some(data) => self.publish(BusEvent::Canvas(data)),
                None => tracing::debug!("Ignoring use_canvas event without an action"),
            },
            UpstreamEvent::Done(_) => self.complete(&mut out),
            UpstreamEvent::Unknown { kind, content } => match content {
                Some(text) if !text.is_empty() => self.text_delta(text, &mut out),
                _ => tracing::trace!(kind = %kind, "Ignoring event without content"),
            },
        }

        out
    }

    /// Force completion at end of stream
    ///
    /// Emits the full envelope even if no event was ever seen. Returns
    /// nothing if the response already finished.
    pub fn finish(&mut self) -> Vec<UiChunk> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.ensure_started(&mut out);
        self.complete(&mut out);
        out
    }

    /// Terminate with a transport failure
    ///
    /// Emits one `error` chunk, then completes the response. Returns nothing
    /// if the response already finished.
    pub fn fail(&mut self, message: &str) -> Vec<UiChunk> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.ensure_started(&mut out);
        out.push(UiChunk::Error {
            error_text: message.to_string(),
        });
        self.complete(&mut out);
        out
    }

    fn ensure_started(&mut self, out: &mut Vec<UiChunk>) {
        if !self.emitted_start {
            out.push(UiChunk::Start);
            out.push(UiChunk::StartStep);
            self.emitted_start = true;
        }
    }

    fn next_text_id(&mut self) -> String {
        let id = format!("text-{}", self.text_counter);
        self.text_counter += 1;
        id
    }

    fn next_reasoning_id(&mut self) -> String {
        let id = format!("reasoning-{}", self.reasoning_counter);
        self.reasoning_counter += 1;
        id
    }

    fn open_text(&mut self, out: &mut Vec<UiChunk>) -> String {
        if let Some(id) = &self.open_text {
            return id.clone();
        }
        let id = self.next_text_id();
        out.push(UiChunk::TextStart { id: id.clone() });
        self.open_text = Some(id.clone());
        id
    }

    fn open_reasoning(&mut self, out: &mut Vec<UiChunk>) -> String {
        if let Some(id) = &self.open_reasoning {
            return id.clone();
        }
        let id = self.next_reasoning_id();
        out.push(UiChunk::ReasoningStart { id: id.clone() });
        self.open_reasoning = Some(id.clone());
        id
    }

    fn text_delta(&mut self, delta: String, out: &mut Vec<UiChunk>) {
        let id = self.open_text(out);
        out.push(UiChunk::TextDelta { id, delta });
    }

    fn reasoning(&mut self, event: ReasoningEvent, out: &mut Vec<UiChunk>) {
        match event.status {
            // A missing status is treated as more reasoning to come
            Some(ReasoningStatus::Thinking) | None => {
                let id = self.open_reasoning(out);
                out.push(UiChunk::ReasoningDelta {
                    id,
                    delta: event.content,
                });
            }
            Some(ReasoningStatus::Done) => {
                let id = self.open_reasoning(out);
                if !event.content.is_empty() {
                    out.push(UiChunk::ReasoningDelta {
                        id: id.clone(),
                        delta: event.content,
                    });
                }
                out.push(UiChunk::ReasoningEnd { id });
                self.open_reasoning = None;
            }
            Some(ReasoningStatus::Other) => {
                tracing::debug!("Ignoring reasoning event with unknown status");
            }
        }
    }

    fn close_segments(&mut self, out: &mut Vec<UiChunk>) {
        if let Some(id) = self.open_text.take() {
            out.push(UiChunk::TextEnd { id });
        }
        if let Some(id) = self.open_reasoning.take() {
            out.push(UiChunk::ReasoningEnd { id });
        }
    }

    fn complete(&mut self, out: &mut Vec<UiChunk>) {
        self.close_segments(out);
        out.push(UiChunk::FinishStep);
        out.push(UiChunk::Finish);
        self.finished = true;
    }

    fn is_aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortHandle::is_aborted)
    }

    fn bind_session(&self, event: &SessionIdEvent) {
        if self.is_aborted() {
            tracing::debug!("Not binding session for an aborted response");
            return;
        }
        let Some(session_id) = event.resolved_id() else {
            tracing::debug!("Ignoring session_id event without an id");
            return;
        };
        let Some(binding) = &self.binding else {
            tracing::debug!(session_id = %session_id, "No thread to bind session to");
            return;
        };
        if let Some(conversation_id) = &event.conversation_id {
            tracing::trace!(conversation_id = %conversation_id, "Session event conversation");
        }
        binding.store.set_session_id(&binding.thread_id, session_id);
    }

    fn publish(&self, event: BusEvent) {
        if self.is_aborted() {
            return;
        }
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }
}

fn tool_result(event: ToolResultEvent) -> UiChunk {
    match event.status {
        Some(ToolResultStatus::Error) => UiChunk::ToolOutputError {
            tool_call_id: event.tool_use_id,
            error_text: event
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_TOOL_ERROR.to_string()),
        },
        _ => UiChunk::ToolOutputAvailable {
            tool_call_id: event.tool_use_id,
            output: event.result,
        },
    }
}

fn sub_agent_start(event: &SubAgentEvent) -> UiChunk {
    UiChunk::ToolInputAvailable {
        tool_call_id: event.call_id().to_string(),
        tool_name: format!("{SUB_AGENT_TOOL_PREFIX}{}", event.data.agent_name),
        input: json!({
            "prompt": event.data.prompt,
            "subAgentId": event.data.sub_agent_id,
        }),
    }
}

fn sub_agent_end(event: SubAgentEndEvent) -> UiChunk {
    UiChunk::ToolOutputAvailable {
        tool_call_id: event.tool_use_id,
        output: json!({ "message": event.data.message }),
    }
}
