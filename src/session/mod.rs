//! Conversation session management
//!
//! This module provides the `ConversationSession` abstraction that manages:
//! - The session lifecycle state machine (idle/connecting/listening/speaking/error)
//! - Microphone capture wiring to the agent channel
//! - Gapless playback of agent speech, including barge-in
//! - Transcript accumulation and turn commits
//! - Guaranteed resource teardown on stop, error, or remote close

mod config;
mod error;
mod session;
mod stats;
mod transcript;

pub use config::SessionConfig;
pub use error::SessionError;
pub use session::{ConversationSession, ConversationStatus};
pub use stats::SessionStats;
pub use transcript::{Speaker, TranscriptAccumulator, TranscriptTurn};
