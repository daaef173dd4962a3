//! Realtime channel to the remote conversational agent.
//!
//! The session controller only sees the traits here; the NATS transport in
//! [`nats`] is the concrete implementation.

pub mod messages;
pub mod nats;

pub use messages::{
    AgentEventMessage, AudioChunkMessage, AudioPayload, ServerMessage, SessionCloseMessage,
    SessionOpenMessage,
};
pub use nats::NatsAgentChannel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::EncodedAudioChunk;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to open agent channel: {0}")]
    Connect(String),

    #[error("failed to send on agent channel: {0}")]
    Send(String),

    #[error("agent channel is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseModality {
    Audio,
    Text,
}

/// What the agent is asked for when a channel opens.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub conversation_id: String,
    pub response_modality: ResponseModality,
    pub transcribe_input: bool,
    pub transcribe_output: bool,
    pub system_instruction: String,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
}

/// Events delivered by an open channel, in arrival order.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The remote confirmed the session; audio may flow.
    Opened,
    /// One update from the agent.
    Message(ServerMessage),
    /// The channel failed; no further events will be useful.
    Error(String),
    /// The remote ended the session.
    Closed,
}

/// An open channel: the send/close handle plus the event stream.
pub struct ChannelConnection {
    pub handle: Box<dyn ChannelHandle>,
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// Factory for realtime agent channels.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn open(&self, config: ChannelConfig) -> Result<ChannelConnection, ChannelError>;
}

/// Send/close side of an open channel.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Forward one encoded capture block to the agent.
    async fn send_audio(&self, chunk: EncodedAudioChunk) -> Result<(), ChannelError>;

    /// Close the channel. Idempotent.
    async fn close(&self) -> Result<(), ChannelError>;
}
