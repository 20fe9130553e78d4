//! Chunk output
//!
//! `send` writes raw NDJSON for other programs; `chat` renders the same
//! chunks as readable text.

use std::io::{self, Stdout, Write};

use anyhow::Result;
use relay_core::{TodoList, UiChunk};

/// Somewhere to put downstream chunks
pub trait ChunkSink {
    /// Handle one chunk
    fn chunk(&mut self, chunk: &UiChunk) -> Result<()>;

    /// Called once the response is over
    fn flush(&mut self) -> Result<()>;
}

/// One JSON object per line
pub struct NdjsonSink<W: Write> {
    out: W,
}

impl NdjsonSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> ChunkSink for NdjsonSink<W> {
    fn chunk(&mut self, chunk: &UiChunk) -> Result<()> {
        writeln!(self.out, "{}", chunk.to_json_line()?)?;
        // Consumers read line by line while the response is still streaming
        self.out.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Human-readable rendering for the interactive chat
pub struct ChatSink<W: Write> {
    out: W,
    /// Whether the cursor is mid-line
    dirty: bool,
}

impl ChatSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ChatSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, dirty: false }
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        if self.dirty {
            writeln!(self.out)?;
            self.dirty = false;
        }
        writeln!(self.out, "{text}")
    }

    fn inline(&mut self, text: &str) -> io::Result<()> {
        write!(self.out, "{text}")?;
        self.dirty = true;
        self.out.flush()
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.dirty {
            writeln!(self.out)?;
            self.dirty = false;
        }
        Ok(())
    }
}

impl<W: Write> ChunkSink for ChatSink<W> {
    fn chunk(&mut self, chunk: &UiChunk) -> Result<()> {
        match chunk {
            UiChunk::TextDelta { delta, .. } => self.inline(delta)?,
            UiChunk::ReasoningStart { .. } => {
                self.end_line()?;
                self.inline("(thinking) ")?;
            }
            UiChunk::ReasoningDelta { delta, .. } => self.inline(delta)?,
            UiChunk::TextEnd { .. } | UiChunk::ReasoningEnd { .. } => self.end_line()?,
            UiChunk::ToolInputAvailable {
                tool_name, input, ..
            } => self.line(&format!("[tool] {tool_name} {input}"))?,
            UiChunk::ToolOutputAvailable { tool_call_id, .. } => {
                self.line(&format!("[tool] {tool_call_id} done"))?;
            }
            UiChunk::ToolOutputError {
                tool_call_id,
                error_text,
            } => self.line(&format!("[tool] {tool_call_id} failed: {error_text}"))?,
            UiChunk::File { url, media_type } => {
                self.line(&format!("[file] {media_type} {url}"))?;
            }
            UiChunk::Error { error_text } => self.line(&format!("[error] {error_text}"))?,
            UiChunk::DataTodoList { id, .. } => self.line(&format!("[todo] list {id} updated"))?,
            UiChunk::DataTodoUpdate { id, .. } => {
                self.line(&format!("[todo] item in {id} updated"))?;
            }
            UiChunk::Start
            | UiChunk::StartStep
            | UiChunk::TextStart { .. }
            | UiChunk::FinishStep
            | UiChunk::Finish => {}
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.end_line()?;
        self.out.flush()?;
        Ok(())
    }
}

/// `thread<TAB>session`, one binding per line
pub fn write_sessions(out: &mut impl Write, bindings: &[(String, String)]) -> io::Result<()> {
    for (thread, session) in bindings {
        writeln!(out, "{thread}\t{session}")?;
    }
    Ok(())
}

/// Checklist view of the todo board
pub fn write_todos(out: &mut impl Write, lists: &[TodoList]) -> io::Result<()> {
    if lists.is_empty() {
        return writeln!(out, "(no todo lists)");
    }
    for list in lists {
        let title = list.title.as_deref().unwrap_or(&list.list_id);
        writeln!(
            out,
            "{title} ({}/{})",
            list.completed_count(),
            list.items.len()
        )?;
        for item in &list.items {
            let mark = if item.is_completed() { 'x' } else { ' ' };
            writeln!(out, "  [{mark}] {}", item.content)?;
        }
    }
    Ok(())
}
