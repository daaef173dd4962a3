use crate::channel::RealtimeChannel;
use crate::config::Config;
use crate::session::ConversationSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Service configuration
    pub config: Arc<Config>,

    /// Channel factory used to dial the agent for each conversation
    pub channel: Arc<dyn RealtimeChannel>,

    /// Active conversation sessions (conversation_id → session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<ConversationSession>>>>,
}

impl AppState {
    pub fn new(config: Config, channel: Arc<dyn RealtimeChannel>) -> Self {
        Self {
            config: Arc::new(config),
            channel,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
