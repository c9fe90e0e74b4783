//! Line framing for the backend command stream.
//!
//! # Responsibilities
//! - Split an arbitrarily chunked byte stream on line-feed (0x0A)
//! - Carry the unterminated tail across `feed` calls
//! - Decode each completed line as UTF-8
//!
//! # Design Decisions
//! - One instance per outbound call, created at call start
//! - A line without its terminator is never a message; `finish` drops it
//! - No CR stripping: the backend serializes without embedded newlines

use crate::protocol::error::ProtocolError;

const LINE_FEED: u8 = b'\n';

/// Incremental byte-to-line framer.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
}

impl StreamDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk and return every line it completed, in order.
    ///
    /// Each entry is one line without its terminator. A line that is not
    /// valid UTF-8 yields an error in its position so earlier lines in the
    /// same chunk can still be applied.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<String, ProtocolError>> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == LINE_FEED) {
            self.buffer.extend_from_slice(&rest[..pos]);
            let line = std::mem::take(&mut self.buffer);
            lines.push(String::from_utf8(line).map_err(ProtocolError::from));
            rest = &rest[pos + 1..];
        }
        self.buffer.extend_from_slice(rest);

        lines
    }

    /// Bytes received since the last line-feed.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// End of stream: discard any unterminated remainder.
    ///
    /// Returns the number of bytes dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }
}
