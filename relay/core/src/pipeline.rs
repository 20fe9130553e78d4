//! Stream Decoding Pipeline
//!
//! Composes the line framer, the upstream parser and the protocol translator
//! for one response:
//!
//! ```text
//! bytes ──► LineDecoder ──► parse_line ──► ProtocolTranslator ──► UiChunk
//! ```

use crate::messages::UiChunk;
use crate::streaming::AbortHandle;
use crate::transport::frame::LineDecoder;
use crate::translator::ProtocolTranslator;
use crate::upstream::parse_line;

/// Bytes in, downstream chunks out
#[derive(Debug, Default)]
pub struct StreamDecoder {
    framer: LineDecoder,
    translator: ProtocolTranslator,
    /// Non-blank lines that failed to parse
    dropped: usize,
}

impl StreamDecoder {
    /// Decoder around a configured translator
    #[must_use]
    pub fn new(translator: ProtocolTranslator) -> Self {
        Self {
            framer: LineDecoder::new(),
            translator,
            dropped: 0,
        }
    }

    /// Tie the translator's side effects to `abort`
    pub(crate) fn set_abort(&mut self, abort: AbortHandle) {
        self.translator.set_abort(abort);
    }

    /// Feed a transport chunk
    pub fn push(&mut self, bytes: &[u8]) -> Vec<UiChunk> {
        let mut out = Vec::new();
        for line in self.framer.decode(bytes) {
            self.line(&line, &mut out);
        }
        out
    }

    /// End of stream
    ///
    /// A final unterminated line is still processed, then the response is
    /// completed if it has not been already.
    pub fn finish(&mut self) -> Vec<UiChunk> {
        let mut out = Vec::new();
        if let Some(rest) = self.framer.flush() {
            self.line(&rest, &mut out);
        }
        out.extend(self.translator.finish());
        out
    }

    /// Transport failure
    ///
    /// Any partial line is discarded.
    pub fn fail(&mut self, message: &str) -> Vec<UiChunk> {
        if self.framer.available() > 0 {
            tracing::debug!(bytes = self.framer.available(), "Discarding partial line on failure");
        }
        self.framer.clear();
        self.translator.fail(message)
    }

    /// Whether `finish` has been emitted
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.translator.is_finished()
    }

    /// Whether `start` has been emitted
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.translator.has_started()
    }

    /// Number of malformed lines dropped so far
    #[must_use]
    pub fn dropped_lines(&self) -> usize {
        self.dropped
    }

    fn line(&mut self, line: &str, out: &mut Vec<UiChunk>) {
        match parse_line(line) {
            Some(event) => out.extend(self.translator.translate(event)),
            None if !line.trim().is_empty() => self.dropped += 1,
            None => {}
        }
    }
}
