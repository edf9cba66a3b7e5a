//! In-memory conversation store with sliding-window eviction.

use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use parking_lot::RwLock;

use crate::{ConversationStore, StoredMessage};

/// Maximum number of messages retained per conversation
pub const MAX_MESSAGES: usize = 20;

/// Process-lifetime, volatile conversation store.
///
/// A single reader/writer lock guards the conversation map; mutations to one
/// conversation are serialized, appends to different conversations contend
/// only on the map lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<String, VecDeque<StoredMessage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryStore {
    fn append(&self, conversation_id: &str, mut message: StoredMessage) -> Result<()> {
        message.timestamp = chrono::Utc::now().timestamp();

        let mut conversations = self.conversations.write();
        let messages = conversations.entry(conversation_id.to_string()).or_default();

        messages.push_back(message);

        // Trim to the most recent MAX_MESSAGES
        while messages.len() > MAX_MESSAGES {
            messages.pop_front();
        }

        Ok(())
    }

    fn recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let conversations = self.conversations.read();
        let Some(messages) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };

        let skip = messages.len().saturating_sub(limit);
        Ok(messages.iter().skip(skip).cloned().collect())
    }
}
