use super::api::{ToolCall, UsagePayload};
use std::time::Duration;
use thiserror::Error;

/// Normalized event delivered to the session controller.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Assistant text fragment; append, never replace.
    Content(String),
    /// Reasoning text fragment; append, never replace.
    Reasoning(String),
    /// Complete tool-call list. Arguments are final and may be parsed.
    ToolCalls(Vec<ToolCall>),
    /// Terminal event of a successful stream.
    Done(Option<TokenUsage>),
    /// Terminal event of a failed, timed out or cancelled stream.
    Error(StreamError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_) | StreamEvent::Error(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream error: {0}")]
    Transport(String),
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("request cancelled")]
    Cancelled,
}

impl StreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StreamError::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
}

impl From<&UsagePayload> for TokenUsage {
    fn from(payload: &UsagePayload) -> Self {
        let cached = payload
            .prompt_cache_hit_tokens
            .or_else(|| {
                payload
                    .prompt_tokens_details
                    .as_ref()
                    .and_then(|details| details.cached_tokens)
            })
            .unwrap_or(0);
        Self {
            input_tokens: payload.prompt_tokens.saturating_sub(cached),
            output_tokens: payload.completion_tokens,
            cached_tokens: cached,
        }
    }
}
