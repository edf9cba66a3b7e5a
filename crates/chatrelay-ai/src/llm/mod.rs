//! LLM module - streaming provider abstraction

mod client;
mod groq;
#[cfg(any(test, feature = "test-utils"))]
mod mock;

pub use client::{
    ChatRequest, Message, ModelId, Role, StreamFragment, StreamHandle, StreamResult,
    StreamingClient, TeardownGuard,
};
pub use groq::GroqClient;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockStep, MockStreamClient};
