mod api;
mod event;
mod message;

pub use api::{
    ChatChunk, ChunkChoice, ChunkDelta, FunctionCall, FunctionDelta, PromptTokensDetails,
    ToolCall, ToolCallDelta, UsagePayload,
};
pub use event::{StreamError, StreamEvent, TokenUsage};
pub use message::{ConversationMessage, Role};
