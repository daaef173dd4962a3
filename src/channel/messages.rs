use serde::{Deserialize, Serialize};

use super::ResponseModality;

/// Session announcement published when a conversation opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOpenMessage {
    pub conversation_id: String,
    pub response_modality: ResponseModality,
    pub transcribe_input: bool,
    pub transcribe_output: bool,
    pub system_instruction: String,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub timestamp: String, // RFC3339
}

/// Published when the local side closes a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCloseMessage {
    pub conversation_id: String,
    pub timestamp: String,
}

/// Microphone audio frame published to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunkMessage {
    pub conversation_id: String,
    pub sequence: u32,
    pub data: String, // Base64-encoded PCM bytes
    pub mime_type: String,
    pub timestamp: String,
}

/// One update from the agent.
///
/// Any combination of fields may be present; absent fields deserialize to
/// their defaults so the agent service can send sparse updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(default)]
    pub input_transcript: Option<String>,
    #[serde(default)]
    pub output_transcript: Option<String>,
    #[serde(default)]
    pub turn_complete: bool,
    /// The user started speaking over the agent (barge-in).
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub audio: Option<AudioPayload>,
}

/// Inline synthesized-speech payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioPayload {
    pub data: String, // Base64-encoded PCM bytes
    pub mime_type: String,
}

/// Envelope received on the agent event subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEventMessage {
    /// The agent accepted the session.
    Ready,
    /// A conversational update.
    Update(ServerMessage),
    /// The agent failed the session.
    Error { message: String },
    /// The agent ended the session.
    Closed,
}
