//! Incremental decoder for `text/event-stream` bodies.
//!
//! Mastodon streaming sends frames like
//!
//! ```text
//! event: update
//! data: {"id":"109", ...}
//!
//! :thump
//! ```
//!
//! Network chunks can split a frame (or a UTF-8 sequence) anywhere, so bytes
//! are buffered until a full line is available.

use super::types::StreamEvent;

/// One complete server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        // comment / heartbeat
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
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Decode a streaming frame into a typed event.
pub fn parse_stream_event(frame: &SseFrame) -> Result<StreamEvent, String> {
    match frame.event.as_str() {
        "update" => serde_json::from_str(&frame.data)
            .map(StreamEvent::Update)
            .map_err(|e| format!("Failed to parse update payload: {}", e)),
        "notification" => serde_json::from_str(&frame.data)
            .map(StreamEvent::Notification)
            .map_err(|e| format!("Failed to parse notification payload: {}", e)),
        "delete" => Ok(StreamEvent::Delete(frame.data.clone())),
        other => Ok(StreamEvent::Other {
            event: other.to_string(),
            payload: frame.data.clone(),
        }),
    }
}
