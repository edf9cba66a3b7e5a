//! Shared application state

use std::sync::Arc;

use chatrelay_ai::StreamingClient;
use chatrelay_storage::ConversationStore;

use crate::config::Config;

/// Per-process wiring shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn StreamingClient>,
    pub store: Arc<dyn ConversationStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        client: Arc<dyn StreamingClient>,
        store: Arc<dyn ConversationStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            client,
            store,
            config,
        }
    }
}
