//! Incremental decoding of the provider's SSE response body.
//!
//! [`ChunkDecoder`] reassembles `data:` lines across TCP chunk boundaries
//! and turns each one into a [`ChunkEvent`]. It never sees the relay's own
//! output framing; it only reads what the upstream sends.

use serde::Deserialize;

use super::types::{ChatCompletionChunk, ErrorEnvelope};

/// Longest unterminated line buffered before the stream is failed.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// What one upstream `data:` line means to the provider stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent {
    /// Delta text from the first choice. May be empty.
    Content(String),
    /// `data: [DONE]` was received.
    Done,
    /// The provider sent an error object in place of a chunk.
    Failed(String),
    /// Upstream bytes that cannot be decoded; reply text would be lost.
    Invalid(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Error(ErrorEnvelope),
    Chunk(ChatCompletionChunk),
}

/// Line-buffering SSE decoder.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    buffer: Vec<u8>,
    done_received: bool,
    failed: bool,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[DONE]` has been seen. Input after it is ignored.
    pub fn done_received(&self) -> bool {
        self.done_received
    }

    /// Done or failed: no further events will be produced.
    fn stopped(&self) -> bool {
        self.done_received || self.failed
    }

    fn fail(&mut self, event: ChunkEvent, events: &mut Vec<ChunkEvent>) {
        self.failed = true;
        self.buffer.clear();
        events.push(event);
    }

    /// Feed a chunk of raw bytes and collect the events of every line it
    /// completes.
    pub fn process_chunk(&mut self, bytes: &[u8]) -> Vec<ChunkEvent> {
        let mut events = Vec::new();
        if self.stopped() {
            return events;
        }

        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line[..line.len() - 1], &mut events);
            if self.stopped() {
                self.buffer.clear();
                return events;
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            tracing::warn!(
                buffered = self.buffer.len(),
                "Oversized unterminated SSE line, failing stream"
            );
            let message = format!("SSE line exceeds {} bytes", MAX_LINE_BYTES);
            self.fail(ChunkEvent::Invalid(message), &mut events);
        }

        events
    }

    /// Flush whatever is left in the buffer as a final line.
    ///
    /// Called once the upstream body has ended.
    pub fn finish(&mut self) -> Vec<ChunkEvent> {
        let mut events = Vec::new();
        if self.stopped() || self.buffer.is_empty() {
            return events;
        }
        let line = std::mem::take(&mut self.buffer);
        self.process_line(&line, &mut events);
        events
    }

    fn process_line(&mut self, line: &[u8], events: &mut Vec<ChunkEvent>) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        let Ok(text) = std::str::from_utf8(line) else {
            tracing::warn!("Non UTF-8 SSE line, failing stream");
            self.fail(
                ChunkEvent::Invalid("SSE line is not valid UTF-8".to_string()),
                events,
            );
            return;
        };

        // event:, id:, retry:, comments and blank separators carry nothing we use
        let Some(data) = text.strip_prefix("data:") else {
            return;
        };
        let data = data.strip_prefix(' ').unwrap_or(data);

        self.process_data(data, events);
    }

    fn process_data(&mut self, data: &str, events: &mut Vec<ChunkEvent>) {
        if data.trim() == "[DONE]" {
            self.done_received = true;
            events.push(ChunkEvent::Done);
            return;
        }

        match serde_json::from_str::<StreamPayload>(data) {
            Ok(StreamPayload::Error(envelope)) => {
                self.fail(ChunkEvent::Failed(envelope.describe()), events);
            }
            Ok(StreamPayload::Chunk(chunk)) => {
                if let Some(content) = chunk.content() {
                    events.push(ChunkEvent::Content(content.to_string()));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed SSE data line, failing stream");
                self.fail(
                    ChunkEvent::Invalid(format!("malformed chunk: {}", e)),
                    events,
                );
            }
        }
    }
}
