use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::ConversationStatus;

/// Point-in-time snapshot of a conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle status.
    pub status: ConversationStatus,

    /// When the current (or most recent) run started.
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since the run started.
    pub duration_secs: f64,

    /// Microphone frames forwarded to the agent.
    pub chunks_sent: usize,

    /// Agent audio chunks scheduled for playback.
    pub chunks_scheduled: usize,

    /// Committed transcript turns.
    pub turns_committed: usize,

    /// Message from the most recent failure, if any.
    pub last_error: Option<String>,
}
