// NATS transport for the agent channel.
//
// Subjects:
//   live.session.open / live.session.close  — session announcements
//   live.audio.<conversation_id>            — outbound microphone frames
//   live.agent.<conversation_id>            — inbound agent events

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::messages::{AgentEventMessage, AudioChunkMessage, SessionCloseMessage, SessionOpenMessage};
use super::{ChannelConfig, ChannelConnection, ChannelError, ChannelEvent, ChannelHandle, RealtimeChannel};
use crate::audio::EncodedAudioChunk;

const OPEN_SUBJECT: &str = "live.session.open";
const CLOSE_SUBJECT: &str = "live.session.close";

fn audio_subject(conversation_id: &str) -> String {
    format!("live.audio.{}", conversation_id)
}

fn event_subject(conversation_id: &str) -> String {
    format!("live.agent.{}", conversation_id)
}

/// Opens agent channels over a NATS server.
pub struct NatsAgentChannel {
    url: String,
}

impl NatsAgentChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RealtimeChannel for NatsAgentChannel {
    async fn open(&self, config: ChannelConfig) -> Result<ChannelConnection, ChannelError> {
        info!("Connecting to NATS at {}", self.url);

        let client = async_nats::connect(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        // Subscribe before announcing so the agent's ready event can't race
        // past us.
        let mut subscriber = client
            .subscribe(event_subject(&config.conversation_id))
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        let open_msg = SessionOpenMessage {
            conversation_id: config.conversation_id.clone(),
            response_modality: config.response_modality,
            transcribe_input: config.transcribe_input,
            transcribe_output: config.transcribe_output,
            system_instruction: config.system_instruction.clone(),
            capture_sample_rate: config.capture_sample_rate,
            playback_sample_rate: config.playback_sample_rate,
            timestamp: Utc::now().to_rfc3339(),
        };

        let payload =
            serde_json::to_vec(&open_msg).map_err(|e| ChannelError::Connect(e.to_string()))?;

        client
            .publish(OPEN_SUBJECT, payload.into())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        info!("Announced session {} to agent", config.conversation_id);

        let (event_tx, event_rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut sent_closed = false;

            while let Some(msg) = subscriber.next().await {
                let event = match serde_json::from_slice::<AgentEventMessage>(&msg.payload) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Failed to parse agent event: {}", e);
                        continue;
                    }
                };

                let mapped = match event {
                    AgentEventMessage::Ready => ChannelEvent::Opened,
                    AgentEventMessage::Update(update) => ChannelEvent::Message(update),
                    AgentEventMessage::Error { message } => ChannelEvent::Error(message),
                    AgentEventMessage::Closed => ChannelEvent::Closed,
                };

                let closed = matches!(mapped, ChannelEvent::Closed);
                if event_tx.send(mapped).await.is_err() {
                    // Session torn down; nobody is listening anymore.
                    return;
                }
                if closed {
                    sent_closed = true;
                    break;
                }
            }

            // Subscription ended without an explicit close event.
            if !sent_closed {
                let _ = event_tx.try_send(ChannelEvent::Closed);
            }
        });

        let handle = NatsChannelHandle {
            client,
            conversation_id: config.conversation_id.clone(),
            audio_subject: audio_subject(&config.conversation_id),
            sequence: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        };

        Ok(ChannelConnection {
            handle: Box::new(handle),
            events: event_rx,
        })
    }
}

struct NatsChannelHandle {
    client: async_nats::Client,
    conversation_id: String,
    audio_subject: String,
    sequence: AtomicU32,
    closed: AtomicBool,
}

#[async_trait]
impl ChannelHandle for NatsChannelHandle {
    async fn send_audio(&self, chunk: EncodedAudioChunk) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }

        let message = AudioChunkMessage {
            conversation_id: self.conversation_id.clone(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            data: chunk.data,
            mime_type: chunk.mime_type,
            timestamp: Utc::now().to_rfc3339(),
        };

        let payload = serde_json::to_vec(&message).map_err(|e| ChannelError::Send(e.to_string()))?;

        self.client
            .publish(self.audio_subject.clone(), payload.into())
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Closing session {}", self.conversation_id);

        let message = SessionCloseMessage {
            conversation_id: self.conversation_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };

        let payload = serde_json::to_vec(&message).map_err(|e| ChannelError::Send(e.to_string()))?;

        self.client
            .publish(CLOSE_SUBJECT, payload.into())
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        Ok(())
    }
}
