//! Line Framing
//!
//! Splits an incoming byte stream into newline-delimited records.
//!
//! # Wire Format
//!
//! ```text
//! {"type":"text_delta","content":"Hel"}\n
//! {"type":"text_delta","content":"lo"}\n
//! {"type":"done"}\n
//! ```
//!
//! Transports deliver arbitrary byte chunks: a record may be split across
//! chunks, several records may share one chunk, and a multi-byte UTF-8
//! character may be cut in half. The decoder buffers raw bytes and only
//! decodes a line once its terminating `\n` has arrived. Since `\n` never
//! appears inside a multi-byte UTF-8 sequence, a split character is always
//! reassembled before decoding.

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Maximum length of a single unterminated line (8 MB)
///
/// A peer that never sends a newline would otherwise grow the buffer forever.
pub const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// Incremental newline framer
///
/// Buffers incoming bytes and yields complete lines.
#[derive(Debug)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
    /// Bytes discarded because a line exceeded `MAX_LINE_LENGTH`
    discarded: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            discarded: 0,
        }
    }

    /// Append a chunk and return every line it completed, in order
    ///
    /// Lines are returned without their trailing `\n`. Empty lines are
    /// returned as empty strings; skipping them is the caller's decision.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<String> {
        self.push(chunk);

        let mut lines = Vec::new();
        while let Some(offset) = self.buffer[self.read_pos..]
            .iter()
            .position(|&b| b == b'\n')
        {
            let end = self.read_pos + offset;
            lines.push(String::from_utf8_lossy(&self.buffer[self.read_pos..end]).into_owned());
            self.read_pos = end + 1;
        }

        if self.available() > MAX_LINE_LENGTH {
            tracing::warn!(
                bytes = self.available(),
                "Discarding oversized unterminated line"
            );
            self.discarded += self.available();
            self.clear();
        }

        lines
    }

    /// Take whatever is left in the buffer as a final, unterminated line
    ///
    /// Returns `None` when nothing is buffered. The decoder is empty afterwards.
    pub fn flush(&mut self) -> Option<String> {
        if self.available() == 0 {
            self.clear();
            return None;
        }
        let remaining = String::from_utf8_lossy(&self.buffer[self.read_pos..]).into_owned();
        self.clear();
        Some(remaining)
    }

    /// Get the number of bytes buffered but not yet returned as a line
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Total bytes dropped because of oversized lines
    #[must_use]
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }

    fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        } else if self.read_pos == self.buffer.len() {
            self.clear();
        }
        self.buffer.extend_from_slice(data);
    }
}
