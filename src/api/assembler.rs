use crate::types::{StreamError, StreamEvent, TokenUsage, ToolCall, ToolCallDelta};

const TOOL_CALLS_FINISH_REASON: &str = "tool_calls";
/// Highest tool-call index accepted from upstream; placeholders fill any gap below it.
const MAX_TOOL_CALL_INDEX: usize = 128;

/// Transport-level event, one field of one SSE chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Reasoning(String),
    Content(String),
    ToolCallFragment(ToolCallDelta),
    Finish(String),
    Usage(TokenUsage),
    Failure(String),
    EndOfTransport,
}

/// Folds raw transport events into normalized stream events.
///
/// Text fragments pass straight through. Tool-call fragments are merged by index and only
/// surface as one complete list once the upstream signals `finish_reason: tool_calls`.
/// Usage is held back and attached to the single terminal `Done`.
#[derive(Debug, Default)]
pub struct DeltaAssembler {
    tool_calls: Vec<ToolCall>,
    usage: Option<TokenUsage>,
    finished: bool,
}

impl DeltaAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, event: RawEvent) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }

        match event {
            RawEvent::Reasoning(text) => Some(StreamEvent::Reasoning(text)),
            RawEvent::Content(text) => Some(StreamEvent::Content(text)),
            RawEvent::ToolCallFragment(fragment) => {
                self.merge_fragment(fragment);
                None
            }
            RawEvent::Finish(reason) => {
                if reason == TOOL_CALLS_FINISH_REASON && !self.tool_calls.is_empty() {
                    Some(StreamEvent::ToolCalls(self.tool_calls.clone()))
                } else {
                    None
                }
            }
            RawEvent::Usage(usage) => {
                self.usage = Some(usage);
                None
            }
            RawEvent::Failure(message) => {
                self.finished = true;
                Some(StreamEvent::Error(StreamError::Transport(message)))
            }
            RawEvent::EndOfTransport => {
                self.finished = true;
                Some(StreamEvent::Done(self.usage.take()))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    fn merge_fragment(&mut self, fragment: ToolCallDelta) {
        let Some(index) = fragment.index else {
            return;
        };
        if index > MAX_TOOL_CALL_INDEX {
            tracing::warn!(index, "discarding tool-call fragment with out-of-range index");
            return;
        }

        while self.tool_calls.len() <= index {
            self.tool_calls.push(ToolCall::placeholder());
        }

        let record = &mut self.tool_calls[index];
        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            record.id = id;
        }
        if let Some(function) = fragment.function {
            if let Some(name) = function.name {
                record.function.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                record.function.arguments.push_str(&arguments);
            }
        }
    }
}
