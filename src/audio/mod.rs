pub mod capture;
pub mod encode;
pub mod output;
pub mod playback;
pub mod recorder;

pub use capture::{CaptureBackend, CaptureBlock, DeviceCaptureBackend};
pub use encode::{encode_block, encode_pcm, quantize, samples_from_pcm, EncodedAudioChunk};
pub use output::DevicePlaybackSink;
pub use playback::{PlaybackEvent, PlaybackScheduler, PlaybackSink, SourceId};
pub use recorder::{RecordingInfo, SessionRecorder};

use thiserror::Error;

/// Errors from the audio device layer (capture and playback).
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio device found on the default host")]
    NoDevice,

    #[error("audio device is already running")]
    AlreadyRunning,

    #[error("audio stream failed: {0}")]
    Stream(String),

    #[error("unsupported stream configuration: {0}")]
    Unsupported(String),
}
