//! Incremental Server-Sent Events framing
//!
//! Upstream chunk boundaries are arbitrary: one frame may be split over many
//! chunks and one chunk may hold many frames. [`SseParser`] buffers raw bytes,
//! cuts them into lines and dispatches a frame on every blank line, so the
//! events produced never depend on where the chunks were split.

/// A fully framed SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A dispatched frame with its accumulated `data:` payload
    Event {
        /// `event:` field, when present
        event: Option<String>,
        /// `id:` field, when present
        id: Option<String>,
        /// `data:` lines joined with `\n`
        data: String,
    },
    /// A `retry:` field asking the client to wait this many milliseconds
    /// before reconnecting
    ReconnectInterval(u64),
}

impl SseEvent {
    /// Payload of a data frame
    pub fn data(&self) -> Option<&str> {
        match self {
            SseEvent::Event { data, .. } => Some(data),
            SseEvent::ReconnectInterval(_) => None,
        }
    }
}

/// Stateful SSE parser; one instance per upstream response.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    /// Bytes of `buf` already searched for a line terminator
    scanned: usize,
    event: Option<String>,
    id: Option<String>,
    data: String,
    has_data: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            ..Self::default()
        }
    }

    /// Feed one raw chunk and return every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        let mut i = self.scanned;

        while i < self.buf.len() {
            match self.buf[i] {
                b'\n' => {
                    self.process_line(start, i, &mut events);
                    i += 1;
                    start = i;
                }
                b'\r' => {
                    // Need the next byte to tell `\r` from `\r\n`.
                    if i + 1 == self.buf.len() {
                        break;
                    }
                    self.process_line(start, i, &mut events);
                    i += if self.buf[i + 1] == b'\n' { 2 } else { 1 };
                    start = i;
                }
                _ => i += 1,
            }
        }

        self.scanned = i - start;
        self.buf.drain(..start);
        events
    }

    /// Feed already-decoded text.
    pub fn feed_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.feed(chunk.as_bytes())
    }

    /// Signal end of input.
    ///
    /// A trailing `\r` still counts as a line terminator; anything after the
    /// last terminator was never completed and is dropped.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.buf.last() == Some(&b'\r') {
            let end = self.buf.len() - 1;
            self.process_line(0, end, &mut events);
        }
        if !self.buf.is_empty() {
            tracing::debug!("Discarding {} unterminated SSE bytes", self.buf.len());
        }
        self.buf.clear();
        self.scanned = 0;
        events
    }

    /// Bytes held back waiting for a line terminator
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn process_line(&mut self, start: usize, end: usize, events: &mut Vec<SseEvent>) {
        let line = match std::str::from_utf8(&self.buf[start..end]) {
            Ok(s) => s.to_string(),
            Err(_) => {
                tracing::warn!("SSE line contains invalid UTF-8, replacing bad bytes");
                String::from_utf8_lossy(&self.buf[start..end]).into_owned()
            }
        };

        if line.is_empty() {
            self.dispatch(events);
            return;
        }

        // Comment
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.trim().parse::<u64>() {
                    events.push(SseEvent::ReconnectInterval(ms));
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, events: &mut Vec<SseEvent>) {
        let event = self.event.take();
        let id = self.id.take();
        let data = std::mem::take(&mut self.data);
        let has_data = std::mem::replace(&mut self.has_data, false);

        if !has_data || data.is_empty() {
            return;
        }

        events.push(SseEvent::Event { event, id, data });
    }
}
