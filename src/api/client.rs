use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{ConversationMessage, Role};
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::{json, Map, Value};
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;
use std::time::Duration;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

pub const SYSTEM_PROMPT: &str = "You are Riptide, a senior software engineer working in the user's terminal.\n\
Think through problems before answering and keep final answers concise.\n\
Use the file tools for every filesystem fact or change instead of guessing file contents.\n\
Read a file before editing it. For edit_file, pick an original_snippet that occurs exactly once.\n\
Prefer create_multiple_files and read_multiple_files when several files are involved.\n\
After each tool result, decide whether another tool call is needed or give the final answer.\n\
Never claim a file was read or written unless the tool call succeeded.";

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, messages: &[ConversationMessage]) -> Result<ByteStream>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_completion_tokens: u32,
    request_timeout: Option<Duration>,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.api.model.clone(),
            base_url: config.api.base_url.clone(),
            max_completion_tokens: config.api.max_completion_tokens,
            request_timeout: config.request_timeout(),
            #[cfg(test)]
            mock_stream_producer: None,
        })
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: None,
            model: "mock-model".to_string(),
            base_url: "http://localhost:8000/v1".to_string(),
            max_completion_tokens: 1024,
            request_timeout: None,
            mock_stream_producer: Some(mock_producer),
        }
    }

    #[cfg(test)]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Opens the raw SSE byte stream for `messages`. Errors here mean the request never
    /// started streaming (connect, auth, HTTP status).
    pub async fn create_stream(&self, messages: &[ConversationMessage]) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(messages);
            }
        }

        let request_url = self.chat_completions_url();
        let payload = self.build_payload(messages);

        if debug_payload_enabled() {
            emit_debug_payload(&request_url, &payload);
        }

        let mut request = self
            .http
            .post(&request_url)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "API endpoint '{}' returned HTTP {}: {}",
                request_url,
                status,
                error_body_message(&body)
            ));
        }

        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }

    pub fn chat_completions_url(&self) -> String {
        let normalized = self.base_url.trim().trim_end_matches('/');
        if normalized.ends_with("/chat/completions") {
            normalized.to_string()
        } else {
            format!("{normalized}/chat/completions")
        }
    }

    fn build_payload(&self, messages: &[ConversationMessage]) -> Value {
        json!({
            "model": self.model,
            "messages": wire_messages(messages),
            "max_tokens": self.max_completion_tokens,
            "stream": true,
            "stream_options": { "include_usage": true },
            "tools": tool_definitions(),
        })
    }
}

/// Renders history into OpenAI-style chat messages. Reasoning is never sent back.
pub fn wire_messages(messages: &[ConversationMessage]) -> Vec<Value> {
    messages.iter().map(wire_message).collect()
}

fn wire_message(message: &ConversationMessage) -> Value {
    let mut out = Map::new();
    out.insert("role".to_string(), json!(message.role.as_str()));

    match message.role {
        Role::Assistant if !message.tool_calls.is_empty() => {
            let content = if message.content.is_empty() {
                Value::Null
            } else {
                Value::String(message.content.clone())
            };
            out.insert("content".to_string(), content);
            out.insert("tool_calls".to_string(), json!(message.tool_calls));
        }
        Role::Tool => {
            out.insert("content".to_string(), json!(message.content));
            if let Some(id) = &message.tool_call_id {
                out.insert("tool_call_id".to_string(), json!(id));
            }
        }
        _ => {
            out.insert("content".to_string(), json!(message.content));
        }
    }

    Value::Object(out)
}

fn error_body_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local API endpoint '{}': {}. Start your local server or update DEEPSEEK_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach API endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("API request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "API endpoint '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("API request to '{}' failed: {}", request_url, error)
}

fn function_tool(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters,
        }
    })
}

pub fn tool_definitions() -> Value {
    json!([
        function_tool(
            "read_file",
            "Read the content of a single file from the filesystem",
            json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "The path to the file to read" }
                },
                "required": ["file_path"]
            }),
        ),
        function_tool(
            "read_multiple_files",
            "Read the content of multiple files from the filesystem",
            json!({
                "type": "object",
                "properties": {
                    "file_paths": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Array of file paths to read"
                    }
                },
                "required": ["file_paths"]
            }),
        ),
        function_tool(
            "create_file",
            "Create a new file or overwrite an existing file with the provided content",
            json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "The path where the file should be created" },
                    "content": { "type": "string", "description": "The content to write to the file" }
                },
                "required": ["file_path", "content"]
            }),
        ),
        function_tool(
            "create_multiple_files",
            "Create multiple files at once",
            json!({
                "type": "object",
                "properties": {
                    "files": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "path": { "type": "string" },
                                "content": { "type": "string" }
                            },
                            "required": ["path", "content"]
                        },
                        "description": "Array of files to create (path, content)"
                    }
                },
                "required": ["files"]
            }),
        ),
        function_tool(
            "edit_file",
            "Edit an existing file by replacing one exact, unique snippet with new content",
            json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "The path to the file to edit" },
                    "original_snippet": { "type": "string", "description": "The exact text snippet to find and replace" },
                    "new_snippet": { "type": "string", "description": "The new text to replace the original snippet with" }
                },
                "required": ["file_path", "original_snippet", "new_snippet"]
            }),
        ),
    ])
}
