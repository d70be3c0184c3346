//! Server-Sent Events framing
//!
//! Turns the raw byte chunks of a `text/event-stream` body into named
//! events. Chunk boundaries can fall anywhere, including in the middle of a
//! line, so incomplete lines are buffered until their terminator arrives.

use tracing::warn;

/// Event name used when a frame carries no `event:` field
const DEFAULT_EVENT_NAME: &str = "message";

/// Longest line we buffer; anything longer is discarded up to its terminator
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// One dispatched event from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Event name (`event:` field)
    pub name: String,
    /// Payload text (`data:` lines joined with `\n`)
    pub data: String,
}

impl RawEvent {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Incremental SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current, not yet terminated line
    line: Vec<u8>,
    /// Pending `event:` value for the frame being built
    event: Option<String>,
    /// Pending `data:` lines for the frame being built
    data: Vec<String>,
    /// Last byte seen was `\r`, so a following `\n` belongs to the same terminator
    after_cr: bool,
    /// Current line exceeded [`MAX_LINE_BYTES`] and is being skipped
    overflowed: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body, returning every event completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawEvent> {
        let mut events = Vec::new();

        for &byte in chunk {
            match byte {
                b'\n' if self.after_cr => {
                    self.after_cr = false;
                }
                b'\r' | b'\n' => {
                    self.after_cr = byte == b'\r';
                    let line = std::mem::take(&mut self.line);
                    if std::mem::take(&mut self.overflowed) {
                        continue;
                    }
                    if let Some(event) = self.process_line(&line) {
                        events.push(event);
                    }
                }
                _ => {
                    self.after_cr = false;
                    if self.overflowed {
                        continue;
                    }
                    if self.line.len() >= MAX_LINE_BYTES {
                        warn!("Dropping event stream line longer than {} bytes", MAX_LINE_BYTES);
                        self.line = Vec::new();
                        self.overflowed = true;
                        continue;
                    }
                    self.line.push(byte);
                }
            }
        }

        events
    }

    fn process_line(&mut self, line: &[u8]) -> Option<RawEvent> {
        if line.is_empty() {
            return self.dispatch();
        }

        let line = String::from_utf8_lossy(line);

        // Comment / keep-alive
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // `id` and `retry` carry nothing the sync engine uses
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<RawEvent> {
        let name = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(RawEvent {
            name: name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string()),
            data,
        })
    }
}
