//! Deterministic scripted stream client for relay and handler tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, Result};
use crate::llm::client::{
    ChatRequest, StreamFragment, StreamHandle, StreamResult, StreamingClient, TeardownGuard,
};

/// Deterministic step for a scripted stream.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Emit a content fragment after an optional delay.
    Fragment {
        id: String,
        content: String,
        delay_ms: u64,
    },
    /// Emit a stream error.
    Error(String),
    /// Block until the request is cancelled, then close.
    Hang,
}

impl MockStep {
    pub fn fragment(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Fragment {
            id: id.into(),
            content: content.into(),
            delay_ms: 0,
        }
    }

    pub fn fragment_after(
        id: impl Into<String>,
        content: impl Into<String>,
        delay_ms: u64,
    ) -> Self {
        Self::Fragment {
            id: id.into(),
            content: content.into(),
            delay_ms,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}

/// A scripted stream client driven by queued steps.
///
/// The stream closes when the script runs dry, mirroring a provider that
/// emitted its terminator.
#[derive(Debug, Clone, Default)]
pub struct MockStreamClient {
    script: Arc<Mutex<VecDeque<MockStep>>>,
}

impl MockStreamClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<MockStep>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(steps))),
        }
    }

    pub async fn push_step(&self, step: MockStep) {
        self.script.lock().await.push_back(step);
    }
}

#[async_trait]
impl StreamingClient for MockStreamClient {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn connect(
        &self,
        parent: &CancellationToken,
        _request: ChatRequest,
    ) -> Result<StreamHandle> {
        let token = parent.child_token();
        let (tx, rx) = mpsc::channel::<StreamResult>(1);
        let script = self.script.clone();

        let reader = token.clone();
        tokio::spawn(async move {
            loop {
                let step = script.lock().await.pop_front();
                let Some(step) = step else { return };

                match step {
                    MockStep::Fragment {
                        id,
                        content,
                        delay_ms,
                    } => {
                        let deliver = async {
                            if delay_ms > 0 {
                                sleep(Duration::from_millis(delay_ms)).await;
                            }
                            tx.send(Ok(StreamFragment { id, content })).await
                        };
                        tokio::select! {
                            _ = reader.cancelled() => return,
                            sent = deliver => {
                                if sent.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    MockStep::Error(message) => {
                        if tx.send(Err(ChatError::Upstream(message))).await.is_err() {
                            return;
                        }
                    }
                    MockStep::Hang => {
                        reader.cancelled().await;
                        return;
                    }
                }
            }
        });

        Ok(StreamHandle::new(rx, TeardownGuard::new(token)))
    }
}
