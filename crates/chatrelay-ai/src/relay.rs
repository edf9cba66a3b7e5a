//! Relay pipeline - drains the stream channel into a downstream sink.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{ChatError, Result};
use crate::llm::StreamResult;

/// Downstream delivery seam for the relay.
///
/// A write covers flush: implementations hand each delta to the transport
/// before returning, so the downstream consumer observes bytes as soon as
/// the provider emits them.
#[async_trait]
pub trait RelaySink: Send {
    async fn write_delta(&mut self, text: &str) -> Result<()>;
}

/// Sink that frames each delta as a body chunk on a response channel.
///
/// The receiving half feeds the streaming HTTP body; a failed send means the
/// downstream client hung up.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl RelaySink for ChannelSink {
    async fn write_delta(&mut self, text: &str) -> Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(text.as_bytes()))
            .await
            .map_err(|_| ChatError::Disconnected("response channel closed".to_string()))
    }
}

/// Completed relay turn, ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Stream id of the turn, used as the conversation key.
    pub conversation_id: String,
    /// Full assistant reply, the concatenation of all content deltas.
    pub reply: String,
}

/// Drain `events` into `sink`, accumulating the assistant reply.
///
/// Results are consumed in arrival order; provider delivery order is
/// authoritative. Fragments with an empty id carry no usable content and are
/// skipped. The first error - upstream, decode, or downstream write - aborts
/// the relay; output already written to the sink is not retracted.
pub async fn relay(
    events: &mut mpsc::Receiver<StreamResult>,
    sink: &mut impl RelaySink,
) -> Result<RelayOutcome> {
    let mut conversation_id = String::new();
    let mut reply = String::new();

    while let Some(result) = events.recv().await {
        let fragment = result?;

        if fragment.id.is_empty() {
            continue;
        }
        conversation_id = fragment.id;

        if fragment.content.is_empty() {
            continue;
        }
        reply.push_str(&fragment.content);
        sink.write_delta(&fragment.content).await?;
    }

    Ok(RelayOutcome {
        conversation_id,
        reply,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StreamFragment;

    #[derive(Default)]
    struct CollectSink {
        written: Vec<String>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl RelaySink for CollectSink {
        async fn write_delta(&mut self, text: &str) -> Result<()> {
            if let Some(limit) = self.fail_after
                && self.written.len() >= limit
            {
                return Err(ChatError::Disconnected("test sink closed".to_string()));
            }
            self.written.push(text.to_string());
            Ok(())
        }
    }

    fn fragment(id: &str, content: &str) -> StreamResult {
        Ok(StreamFragment {
            id: id.to_string(),
            content: content.to_string(),
        })
    }

    #[tokio::test]
    async fn concatenates_deltas_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        for part in ["Hel", "lo", "!"] {
            tx.send(fragment("conv-1", part)).await.unwrap();
        }
        drop(tx);

        let mut sink = CollectSink::default();
        let outcome = relay(&mut rx, &mut sink).await.unwrap();

        assert_eq!(outcome.conversation_id, "conv-1");
        assert_eq!(outcome.reply, "Hello!");
        assert_eq!(sink.written.join(""), "Hello!");
    }

    #[tokio::test]
    async fn skips_fragments_without_id() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(fragment("", "ignored")).await.unwrap();
        tx.send(fragment("conv-2", "kept")).await.unwrap();
        drop(tx);

        let mut sink = CollectSink::default();
        let outcome = relay(&mut rx, &mut sink).await.unwrap();

        assert_eq!(outcome.conversation_id, "conv-2");
        assert_eq!(outcome.reply, "kept");
        assert_eq!(sink.written, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn aborts_on_stream_error() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(fragment("conv-3", "first")).await.unwrap();
        tx.send(Err(ChatError::Upstream("mid-stream failure".to_string())))
            .await
            .unwrap();
        tx.send(fragment("conv-3", "never")).await.unwrap();
        drop(tx);

        let mut sink = CollectSink::default();
        let err = relay(&mut rx, &mut sink).await.unwrap_err();

        assert!(matches!(err, ChatError::Upstream(_)));
        // Output written before the error stays; nothing after it is relayed.
        assert_eq!(sink.written, vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn reports_sink_failure_as_disconnect() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(fragment("conv-4", "one")).await.unwrap();
        tx.send(fragment("conv-4", "two")).await.unwrap();
        drop(tx);

        let mut sink = CollectSink {
            fail_after: Some(1),
            ..Default::default()
        };
        let err = relay(&mut rx, &mut sink).await.unwrap_err();

        assert!(matches!(err, ChatError::Disconnected(_)));
        assert_eq!(sink.written, vec!["one".to_string()]);
    }

    #[tokio::test]
    async fn empty_stream_yields_empty_outcome() {
        let (tx, mut rx) = mpsc::channel::<StreamResult>(1);
        drop(tx);

        let mut sink = CollectSink::default();
        let outcome = relay(&mut rx, &mut sink).await.unwrap();

        assert!(outcome.conversation_id.is_empty());
        assert!(outcome.reply.is_empty());
        assert!(sink.written.is_empty());
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel::<Bytes>(1);
        drop(rx);

        let mut sink = ChannelSink::new(tx);
        let err = sink.write_delta("late").await.unwrap_err();
        assert!(matches!(err, ChatError::Disconnected(_)));
    }
}
