use super::assembler::{DeltaAssembler, RawEvent};
use super::client::{ApiClient, ByteStream};
use super::stream::StreamParser;
use crate::types::{ConversationMessage, StreamError, StreamEvent};
use anyhow::Result;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const EVENT_QUEUE_CAPACITY: usize = 100;

/// Finite, non-restartable sequence of normalized events for one request.
///
/// The last item is always `Done` or `Error`. Dropping the stream stops the worker.
pub struct EventStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    fn terminal(event: StreamEvent) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(event);
        Self { rx }
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl ApiClient {
    /// Starts a request and hands back its event sequence.
    ///
    /// Returns `Err` only when the transport could not be established. Cancellation and
    /// the request timeout both end the sequence with a terminal error event instead,
    /// whether they fire during establishment or mid-stream.
    pub async fn create_stream_with_cancel(
        &self,
        messages: &[ConversationMessage],
        cancel: CancellationToken,
    ) -> Result<EventStream> {
        let timeout = self.request_timeout();
        let deadline = timeout.map(|t| Instant::now() + t);

        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(target: "riptide::api", "stream cancelled before establishment");
                return Ok(EventStream::terminal(StreamEvent::Error(StreamError::Cancelled)));
            }
            _ = wait_for_deadline(deadline) => {
                let limit = timeout.unwrap_or_default();
                tracing::warn!(target: "riptide::api", timeout_secs = limit.as_secs(), "stream establishment timed out");
                return Ok(EventStream::terminal(StreamEvent::Error(StreamError::Timeout(limit))));
            }
            result = self.create_stream(messages) => result?,
        };

        tracing::debug!(
            target: "riptide::api",
            model = self.model(),
            messages = messages.len(),
            "stream opened"
        );

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        tokio::spawn(consume_transport(bytes, tx, cancel, deadline, timeout));
        Ok(EventStream { rx })
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn consume_transport(
    mut bytes: ByteStream,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
) {
    let mut parser = StreamParser::new();
    let mut assembler = DeltaAssembler::new();
    let expiry = wait_for_deadline(deadline);
    tokio::pin!(expiry);

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(target: "riptide::api", "stream cancelled");
                let _ = tx.send(StreamEvent::Error(StreamError::Cancelled)).await;
                return;
            }
            _ = &mut expiry => {
                let limit = timeout.unwrap_or_default();
                tracing::warn!(target: "riptide::api", timeout_secs = limit.as_secs(), "stream timed out");
                let _ = tx.send(StreamEvent::Error(StreamError::Timeout(limit))).await;
                return;
            }
            item = bytes.next() => item,
        };

        let raw_events = match item {
            Some(Ok(chunk)) => parser.process(&chunk),
            Some(Err(error)) => {
                tracing::warn!(target: "riptide::api", error = %error, "stream transport error");
                let _ = tx
                    .send(StreamEvent::Error(StreamError::Transport(error.to_string())))
                    .await;
                return;
            }
            None => {
                // Complete a trailing frame that lacked its blank line, then close.
                let mut tail = parser.process(b"\n\n").unwrap_or_default();
                tail.push(RawEvent::EndOfTransport);
                Ok(tail)
            }
        };

        let raw_events = match raw_events {
            Ok(events) => events,
            Err(error) => {
                let _ = tx
                    .send(StreamEvent::Error(StreamError::Transport(error.to_string())))
                    .await;
                return;
            }
        };

        for raw in raw_events {
            if let Some(event) = assembler.accept(raw) {
                if tx.send(event).await.is_err() {
                    tracing::debug!(target: "riptide::api", "event receiver dropped");
                    return;
                }
            }
            if assembler.is_finished() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::{sse, MockApiClient, MockResponse};
    use crate::types::{TokenUsage, ToolCall};
    use std::sync::Arc;

    fn client(responses: Vec<MockResponse>) -> ApiClient {
        ApiClient::new_mock(Arc::new(MockApiClient::new(responses)))
    }

    async fn collect(mut stream: EventStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_stream_delivers_text_then_single_done() {
        let client = client(vec![MockResponse::Chunks(vec![
            sse::reasoning("think"),
            sse::content("Hel"),
            sse::content("lo"),
            sse::finish("stop"),
            sse::usage(120, 30, 100),
            sse::done(),
        ])]);

        let stream = client
            .create_stream_with_cancel(&[], CancellationToken::new())
            .await
            .expect("stream should start");
        let events = collect(stream).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Reasoning("think".into()),
                StreamEvent::Content("Hel".into()),
                StreamEvent::Content("lo".into()),
                StreamEvent::Done(Some(TokenUsage {
                    input_tokens: 20,
                    output_tokens: 30,
                    cached_tokens: 100,
                })),
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_close_without_done_sentinel_still_terminates() {
        let client = client(vec![MockResponse::Chunks(vec![sse::content("partial")])]);
        let stream = client
            .create_stream_with_cancel(&[], CancellationToken::new())
            .await
            .unwrap();
        let events = collect(stream).await;
        assert_eq!(events.last(), Some(&StreamEvent::Done(None)));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_calls_emitted_before_done() {
        let client = client(vec![MockResponse::Chunks(vec![
            sse::tool_call(0, Some("call_1"), Some("read_file"), "{\"file_path\":"),
            sse::tool_call(0, None, None, "\"a.go\"}"),
            sse::finish("tool_calls"),
            sse::done(),
        ])]);
        let stream = client
            .create_stream_with_cancel(&[], CancellationToken::new())
            .await
            .unwrap();
        let events = collect(stream).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCalls(vec![ToolCall::function(
                    "call_1",
                    "read_file",
                    r#"{"file_path":"a.go"}"#
                )]),
                StreamEvent::Done(None),
            ]
        );
    }

    #[tokio::test]
    async fn test_establishment_failure_is_returned_synchronously() {
        let client = client(vec![MockResponse::Fail("HTTP 401".into())]);
        let result = client
            .create_stream_with_cancel(&[], CancellationToken::new())
            .await;
        let error = result.err().expect("establishment should fail");
        assert!(error.to_string().contains("HTTP 401"));
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_ends_with_cancelled() {
        let client = client(vec![MockResponse::Hang(vec![sse::content("Hel")])]);
        let cancel = CancellationToken::new();
        let mut stream = client
            .create_stream_with_cancel(&[], cancel.clone())
            .await
            .unwrap();

        assert_eq!(stream.recv().await, Some(StreamEvent::Content("Hel".into())));
        cancel.cancel();
        assert_eq!(
            stream.recv().await,
            Some(StreamEvent::Error(StreamError::Cancelled))
        );
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancel_before_establishment_yields_cancelled_event() {
        let client = client(vec![MockResponse::Chunks(vec![sse::done()])]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let events = collect(client.create_stream_with_cancel(&[], cancel).await.unwrap()).await;
        assert_eq!(events, vec![StreamEvent::Error(StreamError::Cancelled)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_from_cancellation() {
        let timeout = Duration::from_secs(5);
        let client = client(vec![MockResponse::Hang(vec![sse::content("slow")])])
            .with_request_timeout(Some(timeout));
        let events = collect(
            client
                .create_stream_with_cancel(&[], CancellationToken::new())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Content("slow".into()),
                StreamEvent::Error(StreamError::Timeout(timeout)),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_frame_ends_stream() {
        let client = client(vec![MockResponse::Chunks(vec![
            r#"{"error":{"message":"Insufficient Balance"}}"#.to_string(),
            sse::content("ignored"),
        ])]);
        let events = collect(
            client
                .create_stream_with_cancel(&[], CancellationToken::new())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(
            events,
            vec![StreamEvent::Error(StreamError::Transport(
                "Insufficient Balance".into()
            ))]
        );
    }
}
