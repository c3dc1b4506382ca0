use crate::api::client::{ByteStream, MockStreamProducer};
use crate::types::ConversationMessage;
use anyhow::Result;
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::sync::{Arc, Mutex};

/// One scripted reply to a stream request.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// SSE `data:` payloads delivered in order, then the transport closes.
    Chunks(Vec<String>),
    /// Delivers the payloads and then never yields again.
    Hang(Vec<String>),
    /// Establishment failure, returned before any byte is streamed.
    Fail(String),
}

#[derive(Clone)]
pub struct MockApiClient {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    requests: Arc<Mutex<Vec<Vec<ConversationMessage>>>>,
}

impl MockApiClient {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Message lists received so far, one entry per stream request.
    pub fn requests(&self) -> Vec<Vec<ConversationMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

fn framed(chunks: Vec<String>) -> Vec<Result<Bytes>> {
    chunks
        .into_iter()
        .map(|s| {
            let framed = if s.starts_with("data:") || s.starts_with(':') {
                s
            } else {
                format!("data: {s}")
            };
            let framed = if framed.ends_with("\n\n") {
                framed
            } else {
                format!("{framed}\n\n")
            };
            Ok(Bytes::from(framed))
        })
        .collect()
}

impl MockStreamProducer for MockApiClient {
    fn create_mock_stream(&self, messages: &[ConversationMessage]) -> Result<ByteStream> {
        self.requests.lock().unwrap().push(messages.to_vec());

        let mut responses_guard = self.responses.lock().unwrap();
        if responses_guard.is_empty() {
            return Err(anyhow::anyhow!(
                "MockApiClient: No more responses configured"
            ));
        }

        match responses_guard.remove(0) {
            MockResponse::Chunks(chunks) => Ok(Box::pin(stream::iter(framed(chunks)))),
            MockResponse::Hang(chunks) => Ok(Box::pin(
                stream::iter(framed(chunks)).chain(stream::pending()),
            )),
            MockResponse::Fail(message) => Err(anyhow::anyhow!(message)),
        }
    }
}

/// SSE payload builders for scripted responses.
pub mod sse {
    use serde_json::json;

    pub fn content(text: &str) -> String {
        json!({ "choices": [{ "index": 0, "delta": { "content": text } }] }).to_string()
    }

    pub fn reasoning(text: &str) -> String {
        json!({ "choices": [{ "index": 0, "delta": { "reasoning_content": text } }] })
            .to_string()
    }

    pub fn tool_call(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> String {
        let mut function = serde_json::Map::new();
        if let Some(name) = name {
            function.insert("name".to_string(), json!(name));
        }
        function.insert("arguments".to_string(), json!(args));
        let mut fragment = json!({ "index": index, "type": "function", "function": function });
        if let Some(id) = id {
            fragment["id"] = json!(id);
        }
        json!({ "choices": [{ "index": 0, "delta": { "tool_calls": [fragment] } }] }).to_string()
    }

    pub fn finish(reason: &str) -> String {
        json!({ "choices": [{ "index": 0, "delta": {}, "finish_reason": reason }] }).to_string()
    }

    pub fn usage(prompt: u64, completion: u64, cached: u64) -> String {
        json!({
            "choices": [],
            "usage": {
                "prompt_tokens": prompt,
                "completion_tokens": completion,
                "prompt_cache_hit_tokens": cached
            }
        })
        .to_string()
    }

    pub fn done() -> String {
        "[DONE]".to_string()
    }
}
