//! ChatRelay AI - streaming provider client and relay pipeline
//!
//! This crate provides:
//! - Chat message and request model for the provider wire format
//! - Streaming client trait with a Groq production variant and a scripted mock
//! - Relay pipeline that forwards content deltas to a downstream sink
//!   while accumulating the full assistant reply

pub mod error;
pub mod llm;
pub mod relay;

pub use error::{ChatError, Result};
pub use llm::{
    ChatRequest, GroqClient, Message, ModelId, Role, StreamFragment, StreamHandle, StreamResult,
    StreamingClient,
};
pub use relay::{ChannelSink, RelayOutcome, RelaySink, relay};
