//! Newline framing for the continuous change feed.
//!
//! The continuous feed is line-delimited JSON interspersed with bare
//! newlines as heartbeats. Body bytes arrive in arbitrary slices; the framer
//! buffers the trailing partial line across pushes and yields complete lines
//! only.

use bytes::{Buf, BytesMut};

use crate::RemoteError;

/// Reassembles newline-terminated lines from arbitrary byte slices.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
}

impl LineFramer {
    /// Creates an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pops the next complete line, without its terminator.
    ///
    /// Returns `Ok(None)` when no full line is buffered yet. A trailing `\r`
    /// is stripped. Invalid UTF-8 in a completed line is a decode error.
    pub fn next_line(&mut self) -> Result<Option<String>, RemoteError> {
        let Some(pos) = self.buf.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let mut line = self.buf.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        let text = std::str::from_utf8(&line)
            .map_err(|e| RemoteError::Decode(format!("invalid utf-8 in feed line: {e}")))?
            .to_string();
        Ok(Some(text))
    }

    /// Bytes of the buffered partial line.
    pub fn pending(&self) -> usize {
        self.buf.remaining()
    }
}
