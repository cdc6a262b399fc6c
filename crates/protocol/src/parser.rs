//! Incremental SSE parser for the client side of the stream.
//!
//! Network chunks split frames at arbitrary byte offsets, including inside
//! a multi-byte character. The parser carries the unterminated tail of each
//! chunk over to the next call and only decodes complete lines.

use ripple_core::stream::{SSE_DATA_PREFIX, SSE_DONE_MESSAGE, StreamEvent};
use tracing::{debug, trace};

/// Error text yielded for a frame whose payload is not a valid event.
pub const PARSE_ERROR_MESSAGE: &str = "Failed to parse SSE message";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SseParser {
    carry: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the events completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.carry.extend_from_slice(chunk);

        let Some(last_newline) = self.carry.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);

        complete
            .split(|b| *b == b'\n')
            .filter_map(parse_line)
            .collect()
    }

    /// Parse whatever is left in the buffer as a final line.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let tail = std::mem::take(&mut self.carry);
        parse_line(&tail).into_iter().collect()
    }

    /// Bytes waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

fn parse_line(line: &[u8]) -> Option<StreamEvent> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Some(data) = line.strip_prefix(SSE_DATA_PREFIX.trim_end()) else {
        trace!(line, "Ignoring non-data line");
        return None;
    };
    let data = data.trim_start();

    if data == SSE_DONE_MESSAGE {
        return Some(StreamEvent::Done);
    }

    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Malformed SSE payload");
            return Some(StreamEvent::error(PARSE_ERROR_MESSAGE));
        }
    };

    let tag = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_owned();
    if !StreamEvent::KNOWN_TAGS.contains(&tag.as_str()) {
        debug!(%tag, "Dropping event with unknown type");
        return None;
    }

    match serde_json::from_value(value) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, %tag, "SSE payload has wrong shape");
            Some(StreamEvent::error(PARSE_ERROR_MESSAGE))
        }
    }
}
