use super::assembler::RawEvent;
use super::logging::emit_sse_parse_error;
use crate::types::{ChatChunk, TokenUsage};
use anyhow::Result;
use serde::Deserialize;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct ErrorFrame {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Splits an SSE byte stream into frames and maps each `chat.completion.chunk` onto
/// transport-level raw events, in the order the fields appear in the chunk.
#[derive(Default)]
pub struct StreamParser {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence cut off by the chunk boundary.
    pending: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<RawEvent>> {
        self.decode_into_buffer(chunk);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        let mut start = 0;

        while let Some(end) = self.buffer[start..].find("\n\n") {
            let frame_end = start + end + 2;
            let frame = &self.buffer[start..frame_end];

            let mut data_lines = Vec::new();
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("data:") {
                    data_lines.push(rest.trim());
                }
            }

            if !data_lines.is_empty() {
                let data = data_lines.join("\n");
                parse_frame_data(&data, &mut events);
            }

            start = frame_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        Ok(events)
    }

    pub fn flush(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        self.buffer.push_str(&String::from_utf8_lossy(&pending));
        std::mem::take(&mut self.buffer)
    }

    fn decode_into_buffer(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // Only an incomplete tail is held back; invalid bytes are replaced below.
            Err(error) if error.error_len().is_none() => error.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let decoded: Vec<u8> = self.pending.drain(..complete).collect();
        self.buffer.push_str(&String::from_utf8_lossy(&decoded));
    }
}

fn parse_frame_data(data: &str, events: &mut Vec<RawEvent>) {
    if data.is_empty() {
        return;
    }
    if data == DONE_SENTINEL {
        events.push(RawEvent::EndOfTransport);
        return;
    }

    match serde_json::from_str::<ChatChunk>(data) {
        Ok(chunk) if !chunk.choices.is_empty() || chunk.usage.is_some() => {
            push_chunk_events(chunk, events);
        }
        Ok(_) => {
            if let Ok(frame) = serde_json::from_str::<ErrorFrame>(data) {
                events.push(RawEvent::Failure(frame.error.message));
            }
        }
        Err(error) => emit_sse_parse_error(data, &error),
    }
}

fn push_chunk_events(chunk: ChatChunk, events: &mut Vec<RawEvent>) {
    if let Some(choice) = chunk.choices.into_iter().next() {
        let delta = choice.delta;
        if let Some(reasoning) = delta.reasoning_content.filter(|text| !text.is_empty()) {
            events.push(RawEvent::Reasoning(reasoning));
        }
        if let Some(content) = delta.content.filter(|text| !text.is_empty()) {
            events.push(RawEvent::Content(content));
        }
        for fragment in delta.tool_calls {
            events.push(RawEvent::ToolCallFragment(fragment));
        }
        if let Some(reason) = choice.finish_reason {
            events.push(RawEvent::Finish(reason));
        }
    }

    if let Some(usage) = chunk.usage.as_ref() {
        events.push(RawEvent::Usage(TokenUsage::from(usage)));
    }
}
