//! Incremental decoder for streaming chat completion responses.
//!
//! The wire format is newline-delimited `data: {...}` lines terminated by a
//! `data: [DONE]` sentinel. Transport chunks do not align with lines, JSON
//! objects or even UTF-8 characters, so raw bytes are buffered until a full
//! line is available.

use serde::Deserialize;

/// A single `data:` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Line splitter that buffers incomplete lines across chunk boundaries.
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed raw bytes from the HTTP response. Returns the payloads of any
    /// complete `data:` lines found.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(payload.to_string()))
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Turns response bytes into `choices[0].delta.content` text fragments.
///
/// Lines that fail to parse are logged and skipped; they never end the stream.
pub struct DeltaDecoder {
    parser: SseParser,
    done: bool,
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self {
            parser: SseParser::new(),
            done: false,
        }
    }

    /// True once the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let events = self.parser.feed(chunk);
        self.collect(events)
    }

    pub fn finish(&mut self) -> Vec<String> {
        let events: Vec<SseEvent> = self.parser.finish().into_iter().collect();
        self.collect(events)
    }

    fn collect(&mut self, events: Vec<SseEvent>) -> Vec<String> {
        let mut deltas = Vec::new();
        for event in events {
            match event {
                SseEvent::Done => self.done = true,
                SseEvent::Data(payload) => {
                    if let Some(text) = parse_delta(&payload) {
                        deltas.push(text);
                    }
                }
            }
        }
        deltas
    }
}

impl Default for DeltaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the non-empty `choices[0].delta.content` of one frame.
pub fn parse_delta(payload: &str) -> Option<String> {
    match serde_json::from_str::<StreamFrame>(payload) {
        Ok(frame) => frame
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|text| !text.is_empty()),
        Err(e) => {
            tracing::debug!(error = %e, line = payload, "Failed to parse stream chunk");
            None
        }
    }
}
