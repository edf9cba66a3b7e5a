//! Streaming client trait and chat types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, Result};

/// Chat message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Parse a wire-level role string. Unrecognized roles are a setup error.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ChatError::InvalidRole(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a message from a wire-level role string.
    pub fn new(role: &str, content: impl Into<String>) -> Result<Self> {
        Ok(Self {
            role: Role::parse(role)?,
            content: content.into(),
        })
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Provider model identifier
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelId {
    #[default]
    #[serde(rename = "llama3-8b-8192")]
    Llama3_8b,
    #[serde(rename = "llama3-70b-8192")]
    Llama3_70b,
    #[serde(rename = "mixtral-8x7b-32768")]
    Mixtral8x7b,
    #[serde(rename = "gemma-7b-it")]
    Gemma7b,
}

/// Provider request payload.
///
/// Built fresh per inbound request and never mutated after being handed to
/// the streaming client.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model: ModelId,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(rename = "max_completion_tokens")]
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatRequest {
    /// Create a streaming request with the service tuning defaults.
    pub fn new(model: ModelId, max_tokens: u32) -> Self {
        Self {
            messages: Vec::new(),
            model,
            temperature: 0.7,
            top_p: 0.85,
            max_tokens,
            stream: true,
        }
    }

    /// Set the conversation messages
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Append one message to the request
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }
}

/// One decoded unit of the provider event stream.
///
/// `id` is empty for housekeeping events that carry no usable content; the
/// relay skips those. Content-bearing fragments share the stable stream id
/// that keys the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    pub id: String,
    pub content: String,
}

/// Tagged unit delivered over the stream channel
pub type StreamResult = Result<StreamFragment>;

/// Cancels the upstream connection when dropped.
///
/// Cancellation is idempotent: calling [`TeardownGuard::teardown`] any number
/// of times and then dropping the guard releases the connection exactly once.
#[derive(Debug)]
pub struct TeardownGuard {
    token: CancellationToken,
}

impl TeardownGuard {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Cancel the upstream connection and its reader task.
    pub fn teardown(&self) {
        self.token.cancel();
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Live upstream stream: the event channel plus its teardown guard.
///
/// The channel is closed exactly once on every path - terminator, transport
/// failure, or cancellation - so consumers can drain until [`StreamHandle::recv`]
/// returns `None`.
#[derive(Debug)]
pub struct StreamHandle {
    events: mpsc::Receiver<StreamResult>,
    guard: TeardownGuard,
}

impl StreamHandle {
    pub(crate) fn new(events: mpsc::Receiver<StreamResult>, guard: TeardownGuard) -> Self {
        Self { events, guard }
    }

    /// Receive the next stream result; `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<StreamResult> {
        self.events.recv().await
    }

    /// Borrow the underlying event channel.
    pub fn events_mut(&mut self) -> &mut mpsc::Receiver<StreamResult> {
        &mut self.events
    }

    /// Release the upstream connection without draining the stream.
    pub fn teardown(&self) {
        self.guard.teardown();
    }
}

/// Streaming chat provider.
///
/// `connect` fails synchronously only for request-setup problems; transport
/// failures after setup arrive as [`StreamResult`] errors on the channel.
#[async_trait]
pub trait StreamingClient: Send + Sync {
    /// Provider name for logs
    fn provider(&self) -> &str;

    /// Open the provider stream for `request` under `parent` cancellation.
    async fn connect(
        &self,
        parent: &CancellationToken,
        request: ChatRequest,
    ) -> Result<StreamHandle>;
}
