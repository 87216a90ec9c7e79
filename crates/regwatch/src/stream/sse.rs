//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; [`SseDecoder::feed`] buffers partial lines
//! and returns every event completed by the chunk.

use bytes::{Buf, BytesMut};
use tracing::warn;

const CR: u8 = b'\r';
const LF: u8 = b'\n';
const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Event name used when the server sends no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// A dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name (`message` unless the server named it).
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// `id` field of this event, if it carried a non-empty one.
    pub id: Option<String>,
}

/// Stateful decoder for one stream connection.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    event: String,
    data: String,
    has_data: bool,
    id: Option<String>,
    started: bool,
}

/// Finds the next end-of-line in `bytes`.
///
/// Returns `(line_end, remainder_start)`, or `None` when more data is needed
/// (including a trailing CR that may be the first half of CRLF).
fn find_eol(bytes: &[u8]) -> Option<(usize, usize)> {
    let first = memchr::memchr2(CR, LF, bytes)?;
    match bytes[first] {
        LF => Some((first, first + 1)),
        _ if first + 1 >= bytes.len() => None,
        _ if bytes[first + 1] == LF => Some((first, first + 2)),
        _ => Some((first, first + 1)),
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body and collect completed events.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        if !self.started {
            if self.buffer.len() < BOM.len() && BOM.starts_with(&self.buffer) {
                return Vec::new();
            }
            if self.buffer.starts_with(BOM) {
                self.buffer.advance(BOM.len());
            }
            self.started = true;
        }

        let mut frames = Vec::new();
        while let Some((line_end, rem_start)) = find_eol(&self.buffer) {
            let line = self.buffer.split_to(line_end).freeze();
            self.buffer.advance(rem_start - line_end);

            match std::str::from_utf8(&line) {
                Ok(line) => {
                    if let Some(frame) = self.process_line(line) {
                        frames.push(frame);
                    }
                }
                Err(e) => warn!(error = %e, "Skipping event stream line with invalid UTF-8"),
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = value.to_string(),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" if !value.contains('\0') => {
                self.id = (!value.is_empty()).then(|| value.to_string());
            }
            // `retry` is ignored: reconnection timing is owned by the client's backoff.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = std::mem::take(&mut self.event);
        let id = self.id.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        Some(SseFrame {
            event: if event.is_empty() {
                DEFAULT_EVENT.to_string()
            } else {
                event
            },
            data: std::mem::take(&mut self.data),
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: change_detected\nid: 42\ndata: {\"a\":1}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "change_detected".to_string(),
                data: "{\"a\":1}".to_string(),
                id: Some("42".to_string()),
            }]
        );
    }

    #[test]
    fn test_chunk_boundaries() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"da").is_empty());
        assert!(decoder.feed(b"ta: hel").is_empty());
        assert!(decoder.feed(b"lo\r").is_empty());
        assert!(decoder.feed(b"\n\r").is_empty());
        let frames = decoder.feed(b"\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, DEFAULT_EVENT);
        assert_eq!(frames[0].data, "hello");
        assert_eq!(frames[0].id, None);
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": keep-alive\ndata: line1\ndata:line2\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "line1\nline2");
    }

    #[test]
    fn test_event_without_data_is_not_dispatched() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: connected\n\n").is_empty());

        // The event name does not leak into the next event.
        let frames = decoder.feed(b"data: x\n\n");
        assert_eq!(frames[0].event, DEFAULT_EVENT);
    }

    #[test]
    fn test_bom_and_cr_line_endings() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"\xEF\xBB").is_empty());
        let frames = decoder.feed(b"\xBFdata: a\rdata: b\r\rdata: c\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "a\nb");
        assert_eq!(frames[1].data, "c");
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: \xFF\xFE\ndata: ok\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "ok");
    }

    #[test]
    fn test_empty_id_is_not_reported() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"id:\ndata: x\n\nid: 7\ndata: y\n\n");
        assert_eq!(frames[0].id, None);
        assert_eq!(frames[1].id.as_deref(), Some("7"));
    }
}
