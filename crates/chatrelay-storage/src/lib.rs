//! ChatRelay Storage - bounded conversation history
//!
//! The store is volatile by design: conversations live for the process
//! lifetime and are lost on restart. Each conversation keeps only its most
//! recent messages (sliding window).

mod memory;

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use memory::{MAX_MESSAGES, MemoryStore};

/// One persisted chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredMessage {
    /// Role of the message sender (e.g., "user" or "assistant")
    pub role: String,
    /// Content of the message
    pub content: String,
    /// Unix timestamp in seconds, assigned at append time
    #[serde(default)]
    pub timestamp: i64,
}

impl StoredMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: 0,
        }
    }
}

/// Keyed, bounded, thread-safe append/read log of conversation messages.
///
/// Errors are reserved for backing stores that can fail; the in-memory
/// variant never does.
pub trait ConversationStore: Send + Sync {
    /// Append `message` to the conversation, stamping it with the current
    /// time and evicting the oldest entries beyond the cap.
    fn append(&self, conversation_id: &str, message: StoredMessage) -> Result<()>;

    /// The most recent `limit` messages in chronological order. Unknown
    /// identifiers yield an empty vector, not an error.
    fn recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<StoredMessage>>;
}

/// Available store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
}

/// Construct the conversation store for `backend`.
pub fn build(backend: StorageBackend) -> Arc<dyn ConversationStore> {
    match backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    }
}
