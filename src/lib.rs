pub mod audio;
pub mod channel;
pub mod config;
pub mod http;
pub mod session;

pub use audio::{
    CaptureBackend, CaptureBlock, DeviceCaptureBackend, DevicePlaybackSink, EncodedAudioChunk,
    PlaybackEvent, PlaybackScheduler, PlaybackSink, SessionRecorder, SourceId,
};
pub use channel::{
    ChannelConfig, ChannelConnection, ChannelEvent, ChannelHandle, NatsAgentChannel,
    RealtimeChannel, ResponseModality, ServerMessage,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{
    ConversationSession, ConversationStatus, SessionConfig, SessionError, SessionStats, Speaker,
    TranscriptTurn,
};
