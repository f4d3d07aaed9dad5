//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; complete lines are consumed as they
//! appear and a frame is dispatched on each blank line. A line ends at
//! `\r\n`, `\n` or a lone `\r`. A frame still open when the stream ends is
//! discarded.

use tracing::warn;

/// Longest line kept; anything longer is dropped when its terminator arrives.
pub const MAX_LINE_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    line_buffer: Vec<u8>,
    overflowed: bool,
    /// The previous chunk ended on `\r`; a leading `\n` belongs to it.
    after_cr: bool,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and collect every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        for &byte in chunk {
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                continue;
            }
            match byte {
                b'\r' | b'\n' => {
                    self.after_cr = byte == b'\r';
                    if let Some(frame) = self.end_line() {
                        frames.push(frame);
                    }
                }
                _ if self.line_buffer.len() >= MAX_LINE_BYTES => self.overflowed = true,
                _ => self.line_buffer.push(byte),
            }
        }
        frames
    }

    fn end_line(&mut self) -> Option<SseFrame> {
        let line = std::mem::take(&mut self.line_buffer);
        if std::mem::take(&mut self.overflowed) {
            warn!(limit = MAX_LINE_BYTES, "dropping over-long event-stream line");
            return None;
        }
        self.process_line(&String::from_utf8_lossy(&line))
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
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event: event.unwrap_or_else(|| "message".to_string()), data, id })
    }
}
