//! Incremental `text/event-stream` decoder for the listen API.

use vitrine_core::{Error, Result};

/// Longest line (or event payload) the decoder buffers, in bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if any.
    pub event: Option<String>,
    /// Concatenated `data:` lines.
    pub data: String,
    /// The `id:` field, if any.
    pub id: Option<String>,
}

/// Decodes arbitrary byte chunks into complete events.
#[derive(Debug)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
    // Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    max_line_len: usize,
    current: SseEvent,
    has_data: bool,
}

impl Default for EventStreamDecoder {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            current: SseEvent::default(),
            has_data: false,
        }
    }
}

impl EventStreamDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps how many bytes a single line or event payload may take.
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Feed a chunk; returns every event completed by it.
    ///
    /// # Errors
    ///
    /// A subscription error when an unterminated line or an event payload
    /// outgrows the configured limit. The decoder is reset and should not
    /// be fed again.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let raw = &self.buffer[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw).into_owned();
            start = end + 1;
            self.scanned = start;
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line_len || self.current.data.len() > self.max_line_len {
            let buffered = self.buffer.len().max(self.current.data.len());
            *self = Self::new().with_max_line_len(self.max_line_len);
            return Err(Error::subscription(format!(
                "change stream line exceeds {} bytes ({buffered} buffered)",
                self.max_line_len
            )));
        }
        Ok(events)
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if !self.has_data && self.current.event.is_none() {
                return None;
            }
            self.has_data = false;
            return Some(std::mem::take(&mut self.current));
        }

        // Comment / keep-alive
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.current.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
                self.has_data = true;
            }
            "id" => self.current.id = Some(value.to_string()),
            _ => {}
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = EventStreamDecoder::new();
        let events = decoder.push(b"event: welcome\ndata: {\"listenerName\":\"x\"}\n\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("welcome"));
        assert_eq!(events[0].data, "{\"listenerName\":\"x\"}");
    }

    #[test]
    fn test_split_across_chunks() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.push(b"event: muta").unwrap().is_empty());
        assert!(decoder.push(b"tion\r\ndata: {}\r\n").unwrap().is_empty());
        let events = decoder.push(b"\r\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("mutation"));
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn test_multiline_data_and_id() {
        let mut decoder = EventStreamDecoder::new();
        let events = decoder.push(b"id: 7\ndata: a\ndata: b\n\n").unwrap();
        assert_eq!(events[0].data, "a\nb");
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let mut decoder = EventStreamDecoder::new();
        let events = decoder.push(b": keep-alive\n\n\nevent: reconnect\n\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("reconnect"));
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut decoder = EventStreamDecoder::new();
        let events = decoder.push(b"event: welcome\ndata: {}\n\nevent: mutation\ndata: {}\n\n").unwrap();
        let names: Vec<_> = events.iter().map(|e| e.event.clone().unwrap()).collect();
        assert_eq!(names, vec!["welcome", "mutation"]);
    }

    #[test]
    fn test_line_split_over_many_chunks() {
        let mut decoder = EventStreamDecoder::new();
        let payload = "x".repeat(10_000);
        let body = format!("event: mutation\ndata: {payload}\n\n");
        let mut events = Vec::new();
        for chunk in body.as_bytes().chunks(7) {
            events.extend(decoder.push(chunk).unwrap());
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, payload);
    }

    #[test]
    fn test_unterminated_line_over_limit_is_error() {
        let mut decoder = EventStreamDecoder::new().with_max_line_len(16);
        assert!(decoder.push(b"data: 0123456789").unwrap().is_empty());
        let err = decoder.push(b"abcdef").unwrap_err();
        assert!(matches!(err, Error::Subscription(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_oversized_event_payload_is_error() {
        let mut decoder = EventStreamDecoder::new().with_max_line_len(8);
        assert!(decoder.push(b"data: abcd\n").unwrap().is_empty());
        assert!(decoder.push(b"data: efgh\n").is_err());
    }

    #[test]
    fn test_lines_within_limit_pass() {
        let mut decoder = EventStreamDecoder::new().with_max_line_len(16);
        let events = decoder.push(b"data: short\n\n").unwrap();
        assert_eq!(events[0].data, "short");
    }
}
