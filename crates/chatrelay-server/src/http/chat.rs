//! Streaming chat endpoint.
//!
//! The handler opens the provider stream under a per-request cancellation
//! token, hands the response body a channel fed by the relay pipeline, and
//! lets a watcher task forward the downstream hang-up signal. Teardown of
//! the upstream connection is owned by the stream handle's guard, so it runs
//! on every exit path of the relay task.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;

use chatrelay_ai::{ChannelSink, ChatRequest, Message, ModelId, RelayOutcome, relay};
use chatrelay_storage::{ConversationStore, MAX_MESSAGES, StoredMessage};

use crate::http::ApiError;
use crate::state::AppState;

/// Inbound chat payload
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub model: Option<ModelId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub role: String,
    pub content: String,
}

/// Handle `POST /chat`: relay one streamed completion turn.
pub async fn send_message(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Response, ApiError> {
    let max_tokens = state.config.token_budget().map_err(|err| {
        tracing::error!(error = %err, "failed to resolve token budget");
        ApiError::internal("Internal Server Error")
    })?;

    let mut request = ChatRequest::new(body.model.unwrap_or_default(), max_tokens);
    for message in &body.messages {
        let message = Message::new(&message.role, message.content.clone()).map_err(|err| {
            tracing::warn!(error = %err, "rejecting chat request");
            ApiError::bad_request("Bad Request")
        })?;
        request.push_message(message);
    }

    // Root cancellation for this request; cancelled when the downstream
    // client goes away.
    let cancel = CancellationToken::new();

    let handle = state.client.connect(&cancel, request).await.map_err(|err| {
        tracing::error!(error = %err, "failed to open provider stream");
        ApiError::internal("Internal Server Error")
    })?;

    let (body_tx, body_rx) = mpsc::channel::<Bytes>(1);

    // Disconnect watcher: its one job is forwarding the hang-up signal.
    {
        let watcher_tx = body_tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            watcher_tx.closed().await;
            tracing::debug!("downstream channel closed, cancelling request");
            cancel.cancel();
        });
    }

    let store = state.store.clone();
    let user_messages = body.messages;
    tokio::spawn(async move {
        let mut handle = handle;
        let mut sink = ChannelSink::new(body_tx);

        match relay(handle.events_mut(), &mut sink).await {
            Ok(outcome) => {
                // Off the response path: a slow store never delays the
                // client-visible stream.
                tokio::spawn(persist_turn(store, user_messages, outcome));
            }
            Err(err) => {
                // Headers are already on the wire; the stream truncates and
                // the turn is not persisted.
                tracing::error!(error = %err, "relay aborted");
            }
        }
    });

    let stream = ReceiverStream::new(body_rx).map(Ok::<_, Infallible>);

    let headers = [
        (header::CONTENT_TYPE, "text/event-stream"),
        (header::CACHE_CONTROL, "no-cache"),
        (header::CONNECTION, "keep-alive"),
    ];
    Ok((headers, Body::from_stream(stream)).into_response())
}

/// Append the completed turn to the conversation history.
///
/// Store failures are logged and never surfaced to the HTTP caller.
async fn persist_turn(
    store: Arc<dyn ConversationStore>,
    user_messages: Vec<InboundMessage>,
    outcome: RelayOutcome,
) {
    if outcome.conversation_id.is_empty() {
        tracing::debug!("stream carried no conversation id, skipping persistence");
        return;
    }

    for message in user_messages {
        if let Err(err) = store.append(
            &outcome.conversation_id,
            StoredMessage::new(message.role, message.content),
        ) {
            tracing::error!(error = %err, "failed to save user message");
        }
    }

    if let Err(err) = store.append(
        &outcome.conversation_id,
        StoredMessage::new("assistant", outcome.reply),
    ) {
        tracing::error!(error = %err, "failed to save assistant reply");
    }

    match store.recent(&outcome.conversation_id, MAX_MESSAGES) {
        Ok(messages) => tracing::debug!(
            conversation = %outcome.conversation_id,
            count = messages.len(),
            "conversation history updated"
        ),
        Err(err) => tracing::error!(error = %err, "failed to fetch recent messages"),
    }
}
