use super::usage::UsageCounters;
use crate::types::{ConversationMessage, Role, TokenUsage, ToolCall};
use chrono::{DateTime, Utc};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Below this many messages `trim` leaves the log alone.
pub const TRIM_THRESHOLD: usize = 20;
pub const DEFAULT_MAX_HISTORY_MESSAGES: usize = 15;

/// Read-only snapshot for status displays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversationStats {
    pub total_messages: usize,
    pub system_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub tool_messages: usize,
    pub usage: UsageCounters,
}

/// Marker embedded in injected file-context system messages.
pub fn file_context_marker(path: &str) -> String {
    format!("Content of file '{path}'")
}

struct HistoryInner {
    messages: Vec<ConversationMessage>,
    max_history_messages: usize,
    usage: UsageCounters,
}

/// Ordered message log plus running token counters.
///
/// Every read and write goes through one lock so a stats read from the UI never observes a
/// half-applied mutation from the controller.
pub struct History {
    inner: RwLock<HistoryInner>,
}

impl History {
    pub fn new(system_prompt: impl Into<String>, max_history_messages: usize) -> Self {
        Self {
            inner: RwLock::new(HistoryInner {
                messages: vec![ConversationMessage::new(Role::System, system_prompt)],
                max_history_messages,
                usage: UsageCounters::default(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HistoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HistoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, message: ConversationMessage) {
        self.write().messages.push(message);
    }

    pub fn add_user_message(&self, content: impl Into<String>) {
        self.push(ConversationMessage::new(Role::User, content));
    }

    pub fn add_assistant_message(&self, content: impl Into<String>, tool_calls: Vec<ToolCall>) {
        self.push(ConversationMessage::assistant(content, tool_calls));
    }

    pub fn add_tool_message(&self, tool_call_id: impl Into<String>, content: impl Into<String>) {
        self.push(ConversationMessage::tool(tool_call_id, content));
    }

    pub fn add_system_message(&self, content: impl Into<String>) {
        self.push(ConversationMessage::new(Role::System, content));
    }

    pub fn messages(&self) -> Vec<ConversationMessage> {
        self.read().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().messages.is_empty()
    }

    pub fn max_history_messages(&self) -> usize {
        self.read().max_history_messages
    }

    pub fn set_max_history_messages(&self, max_history_messages: usize) {
        self.write().max_history_messages = max_history_messages;
    }

    /// Keeps every system message plus the most recent non-system messages.
    ///
    /// Tool messages left at the front of the retained window lose the assistant call they
    /// answer, so they are dropped too.
    pub fn trim(&self) {
        let mut inner = self.write();
        if inner.messages.len() <= TRIM_THRESHOLD {
            return;
        }

        let keep = inner.max_history_messages;
        let (system, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.messages)
            .into_iter()
            .partition(|message| message.role == Role::System);

        let start = rest.len().saturating_sub(keep);
        let recent = rest
            .into_iter()
            .skip(start)
            .skip_while(|message| message.role == Role::Tool);

        let before = system.len();
        inner.messages = system;
        inner.messages.extend(recent);
        tracing::debug!(
            kept = inner.messages.len(),
            system = before,
            "history trimmed"
        );
    }

    /// Resets to the initial system prompt and zeroes all counters.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.messages.truncate(1);
        inner.usage = UsageCounters::default();
    }

    pub fn file_already_in_context(&self, path: &str) -> bool {
        let marker = file_context_marker(path);
        self.read()
            .messages
            .iter()
            .any(|message| message.role == Role::System && message.content.contains(&marker))
    }

    pub fn update_token_usage(&self, usage: TokenUsage) {
        self.update_token_usage_at(usage, Utc::now());
    }

    /// Records usage, classifying it by `at` rather than by when the tokens were generated.
    pub fn update_token_usage_at(&self, usage: TokenUsage, at: DateTime<Utc>) {
        self.write().usage.record(usage, at);
    }

    pub fn stats(&self) -> ConversationStats {
        let inner = self.read();
        let mut stats = ConversationStats {
            total_messages: inner.messages.len(),
            usage: inner.usage,
            ..ConversationStats::default()
        };
        for message in &inner.messages {
            match message.role {
                Role::System => stats.system_messages += 1,
                Role::User => stats.user_messages += 1,
                Role::Assistant => stats.assistant_messages += 1,
                Role::Tool => stats.tool_messages += 1,
            }
        }
        stats
    }

    pub fn last_user_message(&self) -> Option<ConversationMessage> {
        self.last_with_role(Role::User)
    }

    pub fn last_assistant_message(&self) -> Option<ConversationMessage> {
        self.last_with_role(Role::Assistant)
    }

    fn last_with_role(&self, role: Role) -> Option<ConversationMessage> {
        self.read()
            .messages
            .iter()
            .rev()
            .find(|message| message.role == role)
            .cloned()
    }
}
