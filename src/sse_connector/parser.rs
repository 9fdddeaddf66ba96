//! Incremental Server-Sent Events parser
//!
//! Bytes arrive in arbitrary chunks; complete events are emitted on the
//! blank line that terminates them. A line or pending event larger than
//! `max_line` bytes is discarded.

/// Default cap for one line and for one event's joined data
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field (defaults to "message")
    pub event_type: String,
    /// `data:` lines joined with '\n'
    pub data: String,
    pub id: Option<String>,
}

#[derive(Debug)]
pub struct SseParser {
    buffer: Vec<u8>,
    event_type: Option<String>,
    data: Vec<String>,
    data_len: usize,
    id: Option<String>,
    max_line: usize,
    /// Skipping the tail of an oversized line
    discarding: bool,
    /// Pending event exceeded the cap; dropped at the next blank line
    oversized: bool,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_BYTES)
    }
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            event_type: None,
            data: Vec::new(),
            data_len: 0,
            id: None,
            max_line,
            discarding: false,
            oversized: false,
        }
    }

    /// Feed a chunk; returns every event completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches('\n').trim_end_matches('\r');
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }

        if self.buffer.len() > self.max_line {
            tracing::warn!(
                buffered = self.buffer.len(),
                max = self.max_line,
                "SSE line exceeds limit, discarding"
            );
            self.buffer.clear();
            self.discarding = true;
            self.oversized = true;
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.find(':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = Some(value.trim().to_string()),
            "data" => {
                self.data_len += value.len() + 1;
                if self.data_len > self.max_line {
                    self.oversized = true;
                    self.data.clear();
                } else if !self.oversized {
                    self.data.push(value.to_string());
                }
            }
            "id" => self.id = Some(value.to_string()),
            // retry などは無視
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = self.event_type.take();
        let id = self.id.take();
        self.data_len = 0;
        if std::mem::take(&mut self.oversized) {
            self.data.clear();
            tracing::warn!("Dropped oversized SSE event");
            return None;
        }
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event_type: event_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data,
            id,
        })
    }
}
