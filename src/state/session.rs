use crate::types::{ConversationMessage, StreamError, StreamEvent, TokenUsage, ToolCall};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingFirstToken,
    StreamingReasoning,
    StreamingContent,
    AwaitingToolResults,
    Error,
    Cancelled,
}

/// Result of feeding one event into a [`Session`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Reasoning buffer grew. `started` is set on the first reasoning fragment of the request.
    Reasoning { started: bool },
    /// Content buffer grew. `reasoning_finished` is set when this fragment closed the
    /// reasoning sub-state.
    Content { reasoning_finished: bool },
    /// Complete tool-call list stored; execution waits for `Done`.
    ToolCallsReady(Vec<ToolCall>),
    /// Stream finished normally.
    Completed(Completion),
    /// Stream failed. Nothing from this request may be committed.
    Failed(StreamError),
    /// Stream cancelled by the caller. Partial content is discarded.
    Cancelled,
    /// Event arrived after the session already settled.
    Ignored,
}

/// What a finished request leaves behind for the history.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub assistant: Option<ConversationMessage>,
    pub usage: Option<TokenUsage>,
    pub tool_calls: Vec<ToolCall>,
}

/// Per-request accumulation state, threaded through [`Session::advance`] by value.
#[derive(Debug, Clone)]
pub struct Session {
    phase: Phase,
    content: String,
    reasoning: String,
    has_content: bool,
    pending_tool_calls: Vec<ToolCall>,
    follow_up: bool,
    cancel: CancellationToken,
}

impl Default for Session {
    fn default() -> Self {
        Self::idle()
    }
}

impl Session {
    pub fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            content: String::new(),
            reasoning: String::new(),
            has_content: false,
            pending_tool_calls: Vec::new(),
            follow_up: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Fresh session for a new request with empty buffers.
    pub fn begin(follow_up: bool, cancel: CancellationToken) -> Self {
        Self {
            phase: Phase::AwaitingFirstToken,
            follow_up,
            cancel,
            ..Self::idle()
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn has_content(&self) -> bool {
        self.has_content
    }

    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        &self.pending_tool_calls
    }

    pub fn is_follow_up(&self) -> bool {
        self.follow_up
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True while the request is still consuming stream events.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self.phase,
            Phase::AwaitingFirstToken | Phase::StreamingReasoning | Phase::StreamingContent
        )
    }

    /// Signals cancellation. Harmless once the session has settled.
    pub fn cancel(&self) {
        if self.is_streaming() || self.phase == Phase::AwaitingToolResults {
            self.cancel.cancel();
        }
    }

    /// Marks the tool batch as done and returns to idle, keeping the token for the follow-up.
    pub fn tools_finished(self) -> Self {
        Self {
            cancel: self.cancel,
            ..Self::idle()
        }
    }

    /// Settles a session whose request never started streaming.
    pub fn establishment_failed(self) -> Self {
        Self {
            phase: Phase::Error,
            cancel: self.cancel,
            ..Self::idle()
        }
    }

    /// Settles a session cancelled outside of a stream, e.g. during tool execution.
    pub fn cancelled(self) -> Self {
        Self {
            phase: Phase::Cancelled,
            cancel: self.cancel,
            ..Self::idle()
        }
    }

    pub fn advance(mut self, event: StreamEvent) -> (Self, Step) {
        if !self.is_streaming() {
            return (self, Step::Ignored);
        }

        let step = match event {
            StreamEvent::Reasoning(fragment) => {
                let started = self.phase != Phase::StreamingReasoning && self.reasoning.is_empty();
                self.phase = Phase::StreamingReasoning;
                self.reasoning.push_str(&fragment);
                Step::Reasoning { started }
            }
            StreamEvent::Content(fragment) => {
                let reasoning_finished = self.phase == Phase::StreamingReasoning;
                self.phase = Phase::StreamingContent;
                self.content.push_str(&fragment);
                self.has_content = true;
                Step::Content { reasoning_finished }
            }
            StreamEvent::ToolCalls(calls) => {
                self.pending_tool_calls = calls.clone();
                Step::ToolCallsReady(calls)
            }
            StreamEvent::Done(usage) => {
                let assistant = (self.has_content || !self.pending_tool_calls.is_empty()).then(
                    || {
                        ConversationMessage::assistant(
                            self.content.clone(),
                            self.pending_tool_calls.clone(),
                        )
                    },
                );
                self.phase = if self.pending_tool_calls.is_empty() {
                    Phase::Idle
                } else {
                    Phase::AwaitingToolResults
                };
                Step::Completed(Completion {
                    assistant,
                    usage,
                    tool_calls: self.pending_tool_calls.clone(),
                })
            }
            StreamEvent::Error(StreamError::Cancelled) => {
                self.discard_partial();
                self.phase = Phase::Cancelled;
                Step::Cancelled
            }
            StreamEvent::Error(error) => {
                self.discard_partial();
                self.phase = Phase::Error;
                Step::Failed(error)
            }
        };

        (self, step)
    }

    fn discard_partial(&mut self) {
        self.pending_tool_calls.clear();
        self.has_content = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn run(session: Session, events: Vec<StreamEvent>) -> (Session, Vec<Step>) {
        events.into_iter().fold((session, Vec::new()), |(session, mut steps), event| {
            let (session, step) = session.advance(event);
            steps.push(step);
            (session, steps)
        })
    }

    #[test]
    fn test_begin_resets_buffers() {
        let session = Session::begin(true, CancellationToken::new());
        assert_eq!(session.phase(), Phase::AwaitingFirstToken);
        assert!(session.content().is_empty());
        assert!(session.reasoning().is_empty());
        assert!(!session.has_content());
        assert!(session.is_follow_up());
    }

    #[test]
    fn test_reasoning_then_content_sub_states() {
        let (session, steps) = run(
            Session::begin(false, CancellationToken::new()),
            vec![
                StreamEvent::Reasoning("Let me ".into()),
                StreamEvent::Reasoning("think".into()),
                StreamEvent::Content("Hel".into()),
                StreamEvent::Content("lo".into()),
            ],
        );

        assert_eq!(
            steps,
            vec![
                Step::Reasoning { started: true },
                Step::Reasoning { started: false },
                Step::Content { reasoning_finished: true },
                Step::Content { reasoning_finished: false },
            ]
        );
        assert_eq!(session.reasoning(), "Let me think");
        assert_eq!(session.content(), "Hello");
        assert_eq!(session.phase(), Phase::StreamingContent);
    }

    #[test]
    fn test_done_without_tools_returns_to_idle_with_assistant_message() {
        let (session, steps) = run(
            Session::begin(false, CancellationToken::new()),
            vec![
                StreamEvent::Content("Hel".into()),
                StreamEvent::Content("lo".into()),
                StreamEvent::Done(None),
            ],
        );

        assert_eq!(session.phase(), Phase::Idle);
        let Some(Step::Completed(completion)) = steps.last().cloned() else {
            panic!("expected completion, got {steps:?}");
        };
        let assistant = completion.assistant.expect("assistant message");
        assert_eq!(assistant.content, "Hello");
        assert!(assistant.tool_calls.is_empty());
        assert!(completion.tool_calls.is_empty());
    }

    #[test]
    fn test_tool_calls_wait_for_done() {
        let call = ToolCall::function("call_1", "read_file", r#"{"file_path":"a.go"}"#);
        let (session, steps) = run(
            Session::begin(false, CancellationToken::new()),
            vec![StreamEvent::ToolCalls(vec![call.clone()])],
        );
        assert_eq!(steps, vec![Step::ToolCallsReady(vec![call.clone()])]);
        assert!(session.is_streaming());

        let (session, step) = session.advance(StreamEvent::Done(None));
        assert_eq!(session.phase(), Phase::AwaitingToolResults);
        assert_eq!(session.pending_tool_calls(), &[call.clone()]);
        let Step::Completed(completion) = step else {
            panic!("expected completion");
        };
        let assistant = completion.assistant.expect("pure tool-call turn still commits");
        assert!(assistant.content.is_empty());
        assert_eq!(assistant.tool_calls, vec![call]);
    }

    #[test]
    fn test_done_with_nothing_accumulated_commits_nothing() {
        let (session, step) =
            Session::begin(false, CancellationToken::new()).advance(StreamEvent::Done(None));
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(
            step,
            Step::Completed(Completion {
                assistant: None,
                usage: None,
                tool_calls: Vec::new(),
            })
        );
    }

    #[test]
    fn test_cancel_discards_partial_content() {
        let (session, steps) = run(
            Session::begin(false, CancellationToken::new()),
            vec![
                StreamEvent::Content("partial".into()),
                StreamEvent::Error(StreamError::Cancelled),
                StreamEvent::Done(None),
            ],
        );
        assert_eq!(session.phase(), Phase::Cancelled);
        assert!(!session.has_content());
        assert_eq!(steps[1], Step::Cancelled);
        assert_eq!(steps[2], Step::Ignored);
    }

    #[test]
    fn test_error_moves_to_error_phase() {
        let timeout = StreamError::Timeout(Duration::from_secs(120));
        let (session, step) = Session::begin(false, CancellationToken::new())
            .advance(StreamEvent::Error(timeout.clone()));
        assert_eq!(session.phase(), Phase::Error);
        assert_eq!(step, Step::Failed(timeout));
    }

    #[test]
    fn test_cancel_on_settled_session_is_noop() {
        let token = CancellationToken::new();
        let (session, _) = Session::begin(false, token.clone()).advance(StreamEvent::Done(None));
        session.cancel();
        assert!(!token.is_cancelled());

        let live = Session::begin(false, token.clone());
        live.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_tools_finished_keeps_cancel_token() {
        let token = CancellationToken::new();
        let session = Session::begin(false, token.clone())
            .advance(StreamEvent::ToolCalls(vec![ToolCall::function("c", "read_file", "{}")]))
            .0
            .advance(StreamEvent::Done(None))
            .0
            .tools_finished();
        assert_eq!(session.phase(), Phase::Idle);
        token.cancel();
        assert!(session.cancel_token().is_cancelled());
    }
}
