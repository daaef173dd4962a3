use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique conversation identifier.
    pub conversation_id: String,

    /// Microphone capture rate in Hz.
    pub capture_sample_rate: u32,

    /// Playback rate in Hz for agent speech. Independent of the capture
    /// rate; the two are configured separately and never assumed equal.
    pub playback_sample_rate: u32,

    /// System instruction handed to the agent when the channel opens.
    pub system_instruction: String,

    /// Request speech-to-text of the user's audio.
    pub transcribe_input: bool,

    /// Request speech-to-text of the agent's audio.
    pub transcribe_output: bool,

    /// WAV archive path for this session's captured audio, when enabled.
    pub recording_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            conversation_id: format!("conversation-{}", uuid::Uuid::new_v4()),
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            system_instruction: "You are a helpful voice assistant.".to_string(),
            transcribe_input: true,
            transcribe_output: true,
            recording_path: None,
        }
    }
}
