//! Incremental line decoder for Server-Sent-Event streams
//!
//! Transport chunks do not line up with protocol lines: a chunk may carry
//! half a line or several lines at once. The decoder buffers bytes until a
//! newline arrives and hands back whole lines, so UTF-8 sequences split
//! across chunks are reassembled before decoding.

use crate::errors::{BridgeError, Result};
use crate::types::Fragment;
use serde::Deserialize;

/// Maximum bytes buffered for a single line (1MB)
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Sentinel some servers send as the last event
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental SSE line decoder
#[derive(Debug)]
pub struct SseLineDecoder {
    /// Bytes of the current, not yet terminated line
    buffer: Vec<u8>,

    /// Maximum buffer size
    max_line_bytes: usize,
}

impl SseLineDecoder {
    /// Create new decoder with default settings
    pub fn new() -> Self {
        Self::with_capacity(MAX_LINE_BYTES)
    }

    /// Create decoder with custom line limit
    pub fn with_capacity(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_line_bytes,
        }
    }

    /// Add a transport chunk and return every line it completes
    ///
    /// Lines are returned without their terminator; a trailing `\r` is
    /// dropped so CRLF streams decode the same as LF streams.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                lines.push(self.take_line());
                continue;
            }

            if self.buffer.len() >= self.max_line_bytes {
                return Err(BridgeError::StreamingError(format!(
                    "Line exceeds maximum of {} bytes",
                    self.max_line_bytes
                )));
            }
            self.buffer.push(byte);
        }

        Ok(lines)
    }

    /// Flush the unterminated tail once the transport has closed
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        line
    }

    /// Get current buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for SseLineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct DeltaEvent {
    #[serde(default)]
    choices: Vec<DeltaChoice>,
}

#[derive(Debug, Deserialize)]
struct DeltaChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of parsing one protocol line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Delta carrying non-empty content
    Fragment(Fragment),

    /// Well-formed event without content (role preamble, finish reason)
    Empty,

    /// Blank line, comment, `[DONE]`, or unparsable payload
    Skipped,
}

/// Parse one SSE line into a fragment
///
/// Never fails: a malformed line is reported as `Skipped` so it cannot
/// abort an otherwise valid stream.
pub fn parse_delta_line(line: &str) -> LineEvent {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return LineEvent::Skipped;
    }

    let payload = match line.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        // Bare JSON lines are tolerated; other SSE fields are not content
        None if line.starts_with('{') => line,
        None => return LineEvent::Skipped,
    };

    if payload == DONE_SENTINEL {
        return LineEvent::Skipped;
    }

    let event: DeltaEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(_) => return LineEvent::Skipped,
    };

    event
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .and_then(Fragment::new)
        .map(LineEvent::Fragment)
        .unwrap_or(LineEvent::Empty)
}
