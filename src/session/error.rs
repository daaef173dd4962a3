use thiserror::Error;

use crate::audio::AudioError;
use crate::channel::ChannelError;

/// Failures that end a session run.
///
/// All of these are terminal for the current run only: the session lands in
/// the `error` status and a fresh `start()` is always a legal recovery.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Microphone access denied or unavailable.
    #[error("microphone unavailable: {0}")]
    Permission(#[source] AudioError),

    /// Playback device could not be opened.
    #[error("playback device unavailable: {0}")]
    Device(#[source] AudioError),

    /// The agent channel failed to open.
    #[error("agent connection failed: {0}")]
    Connect(#[from] ChannelError),
}
