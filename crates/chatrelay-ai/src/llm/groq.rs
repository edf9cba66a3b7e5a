//! Groq streaming provider (OpenAI-compatible chat completions API)

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, Result};
use crate::llm::client::{
    ChatRequest, StreamFragment, StreamHandle, StreamResult, StreamingClient, TeardownGuard,
};

/// In-band token the provider emits to signal clean end-of-stream.
const STREAM_TERMINATOR: &str = "[DONE]";

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai";

/// Groq chat completions client
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GroqClient {
    /// Create a new Groq client
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at an API-compatible endpoint
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

// Wire types

#[derive(Deserialize, Debug)]
struct ChatChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize, Debug)]
struct ChunkChoice {
    delta: ChunkDelta,
}

// The delta also carries a `role` field on the first event; only the
// content is relayed.
#[derive(Deserialize, Debug)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl ChatChunk {
    fn into_fragment(self) -> StreamFragment {
        let content = self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .unwrap_or_default();
        StreamFragment {
            id: self.id,
            content,
        }
    }
}

#[async_trait]
impl StreamingClient for GroqClient {
    fn provider(&self) -> &str {
        "groq"
    }

    async fn connect(
        &self,
        parent: &CancellationToken,
        request: ChatRequest,
    ) -> Result<StreamHandle> {
        // Serialization failure is a setup error: no channel is handed out.
        let body = serde_json::to_vec(&request)?;

        let http_request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .body(body);

        let token = parent.child_token();
        let (tx, rx) = mpsc::channel::<StreamResult>(1);

        let reader = token.clone();
        tokio::spawn(async move {
            read_stream(http_request, tx, reader).await;
        });

        Ok(StreamHandle::new(rx, TeardownGuard::new(token)))
    }
}

/// Drive the SSE response and publish decoded fragments.
///
/// The sender is dropped on every return path, closing the channel exactly
/// once. Cancellation closes it silently; transport failures surface as a
/// single error beforehand. A malformed event yields an error for that event
/// only and the loop keeps reading.
async fn read_stream(
    request: reqwest::RequestBuilder,
    tx: mpsc::Sender<StreamResult>,
    token: CancellationToken,
) {
    let response = tokio::select! {
        _ = token.cancelled() => return,
        sent = request.send() => match sent {
            Ok(response) => response,
            Err(err) => {
                let _ = tx
                    .send(Err(ChatError::Upstream(format!(
                        "failed to connect to SSE stream: {err}"
                    ))))
                    .await;
                return;
            }
        },
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let _ = tx
            .send(Err(ChatError::Upstream(format!(
                "provider returned {status}: {}",
                truncate_error_body(body)
            ))))
            .await;
        return;
    }

    let mut byte_stream = response.bytes_stream();
    let mut buffer = String::new();

    loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => return,
            chunk = byte_stream.next() => chunk,
        };

        let bytes = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                if !token.is_cancelled() {
                    let _ = tx
                        .send(Err(ChatError::Upstream(format!("stream error: {err}"))))
                        .await;
                }
                return;
            }
            None => break,
        };

        buffer.push_str(&String::from_utf8_lossy(&bytes));

        // Process complete SSE events from the buffer
        while let Some(pos) = buffer.find("\n\n") {
            let event = buffer[..pos].to_string();
            buffer.drain(..pos + 2);

            for line in event.lines() {
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                tracing::trace!(data, "received SSE event");

                if data.trim() == STREAM_TERMINATOR {
                    // Natural completion: tear down our own reader and close.
                    token.cancel();
                    return;
                }

                let result = match serde_json::from_str::<ChatChunk>(data) {
                    Ok(chunk) => Ok(chunk.into_fragment()),
                    Err(err) => Err(ChatError::Decode(err)),
                };

                if tx.send(result).await.is_err() {
                    // Consumer hung up; nothing left to deliver.
                    return;
                }
            }
        }
    }

    // The last event may lack a trailing \n\n when the connection ends early;
    // deliver it best-effort.
    let remaining = buffer.trim();
    for line in remaining.lines() {
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        if data.trim() == STREAM_TERMINATOR || data.trim().is_empty() {
            continue;
        }
        if let Ok(chunk) = serde_json::from_str::<ChatChunk>(data)
            && tx.send(Ok(chunk.into_fragment())).await.is_err()
        {
            return;
        }
    }
}

// Truncate provider error bodies to keep log lines bounded.
const MAX_ERROR_BODY: usize = 512;

fn truncate_error_body(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut cut = MAX_ERROR_BODY;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... [truncated]", &body[..cut])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::llm::client::{Message, ModelId};

    fn sse_body(events: &[&str]) -> String {
        events
            .iter()
            .map(|data| format!("data: {data}\n\n"))
            .collect()
    }

    fn chunk_json(id: &str, content: &str) -> String {
        serde_json::json!({
            "id": id,
            "choices": [{"delta": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    async fn mock_provider(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    fn sse_template(body: String) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
    }

    fn request() -> ChatRequest {
        ChatRequest::new(ModelId::Llama3_70b, 64).with_messages(vec![Message::user("Hello")])
    }

    #[tokio::test]
    async fn streams_fragments_until_terminator() {
        let server = mock_provider(sse_template(sse_body(&[
            &chunk_json("chatcmpl-123", "Hel"),
            &chunk_json("chatcmpl-123", "lo"),
            &chunk_json("chatcmpl-123", "!"),
            "[DONE]",
        ])))
        .await;

        let client = GroqClient::new("test-key").with_base_url(server.uri());
        let token = CancellationToken::new();
        let mut handle = client.connect(&token, request()).await.unwrap();

        let mut fragments = Vec::new();
        while let Some(result) = handle.recv().await {
            fragments.push(result.unwrap());
        }

        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].id, "chatcmpl-123");
        let reply: String = fragments.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(reply, "Hello!");
    }

    #[tokio::test]
    async fn terminator_never_reaches_consumer() {
        let server = mock_provider(sse_template(sse_body(&[
            &chunk_json("chatcmpl-5", "ok"),
            "[DONE]",
            &chunk_json("chatcmpl-5", "after"),
        ])))
        .await;

        let client = GroqClient::new("test-key").with_base_url(server.uri());
        let token = CancellationToken::new();
        let mut handle = client.connect(&token, request()).await.unwrap();

        let mut contents = Vec::new();
        while let Some(result) = handle.recv().await {
            contents.push(result.unwrap().content);
        }

        // Nothing after the terminator is emitted, and the token itself
        // never shows up as content.
        assert_eq!(contents, vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn malformed_event_yields_error_without_closing() {
        let server = mock_provider(sse_template(sse_body(&[
            r#"{"invalid_json": "#,
            &chunk_json("chatcmpl-9", "ok"),
            "[DONE]",
        ])))
        .await;

        let client = GroqClient::new("test-key").with_base_url(server.uri());
        let token = CancellationToken::new();
        let mut handle = client.connect(&token, request()).await.unwrap();

        let first = handle.recv().await.unwrap();
        assert!(matches!(first, Err(ChatError::Decode(_))));

        let second = handle.recv().await.unwrap().unwrap();
        assert_eq!(second.content, "ok");

        assert!(handle.recv().await.is_none());
    }

    #[tokio::test]
    async fn terminator_only_stream_closes_silently() {
        let server = mock_provider(sse_template(sse_body(&["[DONE]"]))).await;

        let client = GroqClient::new("test-key").with_base_url(server.uri());
        let token = CancellationToken::new();
        let mut handle = client.connect(&token, request()).await.unwrap();

        assert!(handle.recv().await.is_none());
    }

    #[tokio::test]
    async fn upstream_failure_surfaces_single_error() {
        let server = mock_provider(ResponseTemplate::new(500).set_body_string("boom")).await;

        let client = GroqClient::new("test-key").with_base_url(server.uri());
        let token = CancellationToken::new();
        let mut handle = client.connect(&token, request()).await.unwrap();

        let first = handle.recv().await.unwrap();
        match first {
            Err(ChatError::Upstream(message)) => assert!(message.contains("500")),
            other => panic!("expected upstream error, got {other:?}"),
        }

        assert!(handle.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancelling_parent_closes_channel_promptly() {
        let server = mock_provider(
            sse_template(sse_body(&["[DONE]"])).set_delay(Duration::from_secs(30)),
        )
        .await;

        let client = GroqClient::new("test-key").with_base_url(server.uri());
        let token = CancellationToken::new();
        let mut handle = client.connect(&token, request()).await.unwrap();

        token.cancel();

        let closed = tokio::time::timeout(Duration::from_secs(2), handle.recv())
            .await
            .expect("channel should close after cancellation");
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn dropping_handle_leaves_parent_token_untouched() {
        let server = mock_provider(
            sse_template(sse_body(&["[DONE]"])).set_delay(Duration::from_secs(30)),
        )
        .await;

        let client = GroqClient::new("test-key").with_base_url(server.uri());
        let token = CancellationToken::new();
        let handle = client.connect(&token, request()).await.unwrap();

        // Teardown cancels only the derived child token.
        drop(handle);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn event_without_trailing_separator_is_delivered() {
        let body = format!("data: {}\n\ndata: {}", chunk_json("c-1", "a"), chunk_json("c-1", "b"));
        let server = mock_provider(sse_template(body)).await;

        let client = GroqClient::new("test-key").with_base_url(server.uri());
        let token = CancellationToken::new();
        let mut handle = client.connect(&token, request()).await.unwrap();

        let mut contents = Vec::new();
        while let Some(result) = handle.recv().await {
            contents.push(result.unwrap().content);
        }
        assert_eq!(contents, vec!["a".to_string(), "b".to_string()]);
    }
}
