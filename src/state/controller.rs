use super::history::History;
use super::session::{Completion, Phase, Session, Step};
use crate::api::{ApiClient, SYSTEM_PROMPT};
use crate::config::Config;
use crate::tools::{FileOperations, ToolExecutor};
use crate::types::{StreamError, StreamEvent, TokenUsage, ToolCall};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// UI-facing progress of a turn. Text updates carry the cumulative buffer, never a diff.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    ReasoningStarted,
    Reasoning(String),
    ReasoningFinished,
    Content(String),
    ToolCallsReady(Vec<ToolCall>),
    ToolStarted {
        index: usize,
        total: usize,
        call: ToolCall,
    },
    ToolFinished {
        call_id: String,
        name: String,
        output: String,
        success: bool,
    },
    FollowUp,
    Usage(TokenUsage),
    Error {
        message: String,
        is_timeout: bool,
    },
    Cancelled,
    TurnComplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Final assistant content of the turn and the number of tool batches it ran.
    Completed { content: String, tool_rounds: usize },
    Failed { message: String, is_timeout: bool },
    Cancelled,
}

fn emit_update(updates: Option<&mpsc::UnboundedSender<SessionUpdate>>, update: SessionUpdate) {
    if let Some(tx) = updates {
        let _ = tx.send(update);
    }
}

pub struct SessionController {
    client: Arc<ApiClient>,
    history: Arc<History>,
    tools: Arc<dyn ToolExecutor>,
    config: Config,
    session: Session,
}

impl SessionController {
    pub fn new(config: Config) -> Result<Self> {
        let client = ApiClient::new(&config)?;
        let history = Arc::new(History::new(SYSTEM_PROMPT, config.ui.max_history_messages));
        let tools = Arc::new(FileOperations::new(
            config.working_dir.clone(),
            config.file_operations.max_file_size_mb,
        ));
        Ok(Self::with_parts(client, history, tools, config))
    }

    pub fn with_parts(
        client: ApiClient,
        history: Arc<History>,
        tools: Arc<dyn ToolExecutor>,
        config: Config,
    ) -> Self {
        Self {
            client: Arc::new(client),
            history,
            tools,
            config,
            session: Session::idle(),
        }
    }

    pub fn history(&self) -> Arc<History> {
        Arc::clone(&self.history)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Replaces the configuration wholesale between turns.
    pub fn reconfigure(&mut self, config: Config) -> Result<()> {
        if config.api != self.config.api || config.api_key != self.config.api_key {
            self.client = Arc::new(ApiClient::new(&config)?);
        }
        if config.file_operations != self.config.file_operations
            || config.working_dir != self.config.working_dir
        {
            self.tools = Arc::new(FileOperations::new(
                config.working_dir.clone(),
                config.file_operations.max_file_size_mb,
            ));
        }
        self.history
            .set_max_history_messages(config.ui.max_history_messages);
        self.config = config;
        Ok(())
    }

    /// Runs one user turn to a settled state, chaining follow-up requests after tool batches.
    ///
    /// Taking `&mut self` keeps at most one stream active per controller.
    pub async fn submit(
        &mut self,
        input: String,
        cancel: CancellationToken,
        updates: Option<&mpsc::UnboundedSender<SessionUpdate>>,
    ) -> TurnOutcome {
        let outcome = self.drive_turn(input, cancel, updates).await;
        // Every terminal outcome leaves the controller ready for the next input.
        self.session = Session::idle();
        outcome
    }

    async fn drive_turn(
        &mut self,
        input: String,
        cancel: CancellationToken,
        updates: Option<&mpsc::UnboundedSender<SessionUpdate>>,
    ) -> TurnOutcome {
        self.history.trim();
        self.history.add_user_message(input);

        let mut follow_up = false;
        let mut tool_rounds = 0usize;

        loop {
            if follow_up {
                tracing::info!(round = tool_rounds, "follow-up issued");
                emit_update(updates, SessionUpdate::FollowUp);
            }

            let completion = match self.stream_once(follow_up, &cancel, updates).await {
                Ok(completion) => completion,
                Err(outcome) => return outcome,
            };

            if let Some(assistant) = completion.assistant {
                self.history
                    .add_assistant_message(assistant.content, assistant.tool_calls);
            }
            if let Some(usage) = completion.usage {
                tracing::debug!(
                    input = usage.input_tokens,
                    output = usage.output_tokens,
                    cached = usage.cached_tokens,
                    "usage recorded"
                );
                self.history.update_token_usage(usage);
                emit_update(updates, SessionUpdate::Usage(usage));
            }

            if completion.tool_calls.is_empty() {
                let content = self.session.content().to_string();
                emit_update(updates, SessionUpdate::TurnComplete);
                return TurnOutcome::Completed {
                    content,
                    tool_rounds,
                };
            }

            self.run_tools(&completion.tool_calls, updates).await;
            tool_rounds += 1;
            self.session = std::mem::take(&mut self.session).tools_finished();

            if cancel.is_cancelled() {
                tracing::info!("turn cancelled during tool execution");
                self.session = std::mem::take(&mut self.session).cancelled();
                emit_update(updates, SessionUpdate::Cancelled);
                return TurnOutcome::Cancelled;
            }
            follow_up = true;
        }
    }

    /// Opens one request and consumes it until a terminal event.
    async fn stream_once(
        &mut self,
        follow_up: bool,
        cancel: &CancellationToken,
        updates: Option<&mpsc::UnboundedSender<SessionUpdate>>,
    ) -> std::result::Result<Completion, TurnOutcome> {
        self.session = Session::begin(follow_up, cancel.clone());
        let messages = self.history.messages();

        let mut stream = match self
            .client
            .create_stream_with_cancel(&messages, cancel.clone())
            .await
        {
            Ok(stream) => stream,
            Err(error) => {
                let message = format!("{error:#}");
                tracing::warn!(error = %message, "stream could not be established");
                self.session = std::mem::take(&mut self.session).establishment_failed();
                emit_update(
                    updates,
                    SessionUpdate::Error {
                        message: message.clone(),
                        is_timeout: false,
                    },
                );
                return Err(TurnOutcome::Failed {
                    message,
                    is_timeout: false,
                });
            }
        };

        loop {
            let event = stream.recv().await.unwrap_or_else(|| {
                StreamEvent::Error(StreamError::Transport(
                    "stream closed without a terminal event".to_string(),
                ))
            });
            let (session, step) = std::mem::take(&mut self.session).advance(event);
            self.session = session;

            match step {
                Step::Reasoning { started } => {
                    if started {
                        emit_update(updates, SessionUpdate::ReasoningStarted);
                    }
                    emit_update(
                        updates,
                        SessionUpdate::Reasoning(self.session.reasoning().to_string()),
                    );
                }
                Step::Content { reasoning_finished } => {
                    if reasoning_finished {
                        emit_update(updates, SessionUpdate::ReasoningFinished);
                    }
                    emit_update(
                        updates,
                        SessionUpdate::Content(self.session.content().to_string()),
                    );
                }
                Step::ToolCallsReady(calls) => {
                    emit_update(updates, SessionUpdate::ToolCallsReady(calls));
                }
                Step::Completed(completion) => return Ok(completion),
                Step::Failed(error) => {
                    let is_timeout = error.is_timeout();
                    let message = error.to_string();
                    emit_update(
                        updates,
                        SessionUpdate::Error {
                            message: message.clone(),
                            is_timeout,
                        },
                    );
                    return Err(TurnOutcome::Failed {
                        message,
                        is_timeout,
                    });
                }
                Step::Cancelled => {
                    emit_update(updates, SessionUpdate::Cancelled);
                    return Err(TurnOutcome::Cancelled);
                }
                Step::Ignored => {}
            }
        }
    }

    /// Executes the batch in order. Every call gets exactly one tool message, success or not.
    async fn run_tools(
        &self,
        calls: &[ToolCall],
        updates: Option<&mpsc::UnboundedSender<SessionUpdate>>,
    ) {
        let total = calls.len();
        for (index, call) in calls.iter().enumerate() {
            emit_update(
                updates,
                SessionUpdate::ToolStarted {
                    index,
                    total,
                    call: call.clone(),
                },
            );
            tracing::info!(tool = %call.function.name, id = %call.id, "tool execution started");

            let tools = Arc::clone(&self.tools);
            let owned_call = call.clone();
            let result = tokio::task::spawn_blocking(move || tools.execute(&owned_call)).await;

            let (output, success) = match result {
                Ok(Ok(output)) => (output, true),
                Ok(Err(error)) => (format!("Error: {error:#}"), false),
                Err(join_error) => (format!("Error: tool execution failed: {join_error}"), false),
            };
            tracing::info!(tool = %call.function.name, id = %call.id, success, "tool execution finished");

            self.history.add_tool_message(call.id.clone(), output.clone());
            emit_update(
                updates,
                SessionUpdate::ToolFinished {
                    call_id: call.id.clone(),
                    name: call.function.name.clone(),
                    output,
                    success,
                },
            );
        }
    }
}
