use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::{
    encode, CaptureBackend, CaptureBlock, PlaybackEvent, PlaybackScheduler, PlaybackSink,
    SessionRecorder,
};
use crate::channel::{
    ChannelConfig, ChannelEvent, ChannelHandle, RealtimeChannel, ResponseModality, ServerMessage,
};

use super::config::SessionConfig;
use super::error::SessionError;
use super::stats::SessionStats;
use super::transcript::{Speaker, TranscriptAccumulator, TranscriptTurn};

/// The single authoritative lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Idle,
    Connecting,
    Listening,
    Speaking,
    Error,
}

/// A live conversation session.
///
/// Owns the status state machine and every session resource: the capture
/// backend, the playback sink and scheduler, the transcript, and the agent
/// channel handle. Capture, playback, and channel events all funnel through
/// one driver task per run, so transitions are serialized.
pub struct ConversationSession {
    config: SessionConfig,
    channel: Arc<dyn RealtimeChannel>,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    status: ConversationStatus,
    /// Bumped on every start and stop. Late work from an old run compares
    /// against it and walks away instead of mutating the new run's state.
    run_id: u64,
    capture: Box<dyn CaptureBackend>,
    sink: Box<dyn PlaybackSink>,
    scheduler: PlaybackScheduler,
    transcript: TranscriptAccumulator,
    handle: Option<Box<dyn ChannelHandle>>,
    driver: Option<JoinHandle<()>>,
    recorder: Option<SessionRecorder>,
    started_at: Option<DateTime<Utc>>,
    chunks_sent: usize,
    chunks_scheduled: usize,
    last_error: Option<String>,
}

impl ConversationSession {
    /// Create a session around injected capabilities.
    ///
    /// The channel factory, capture backend, and playback sink arrive as
    /// trait objects; the session never reaches for ambient device state.
    pub fn new(
        config: SessionConfig,
        channel: Arc<dyn RealtimeChannel>,
        capture: Box<dyn CaptureBackend>,
        sink: Box<dyn PlaybackSink>,
    ) -> Self {
        let scheduler = PlaybackScheduler::new(config.playback_sample_rate);

        Self {
            config,
            channel,
            inner: Arc::new(Mutex::new(Inner {
                status: ConversationStatus::Idle,
                run_id: 0,
                capture,
                sink,
                scheduler,
                transcript: TranscriptAccumulator::new(),
                handle: None,
                driver: None,
                recorder: None,
                started_at: None,
                chunks_sent: 0,
                chunks_scheduled: 0,
                last_error: None,
            })),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.config.conversation_id
    }

    /// Begin a session run.
    ///
    /// No-op when already connecting or active. From `idle` or `error` this
    /// opens the microphone, opens the playback sink, and dials the agent;
    /// a failure at any step tears down whatever was acquired and lands in
    /// the `error` status.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;

        if matches!(
            inner.status,
            ConversationStatus::Connecting | ConversationStatus::Listening | ConversationStatus::Speaking
        ) {
            warn!("Session {} already active", self.config.conversation_id);
            return Ok(());
        }

        info!("Starting conversation session: {}", self.config.conversation_id);

        // Fresh run: nothing from a prior run may leak in.
        inner.run_id = inner.run_id.wrapping_add(1);
        let run_id = inner.run_id;
        inner.transcript.reset();
        inner.scheduler.reset();
        inner.chunks_sent = 0;
        inner.chunks_scheduled = 0;
        inner.last_error = None;
        inner.started_at = Some(Utc::now());
        transition(&mut inner, ConversationStatus::Connecting);

        // Microphone first; denial surfaces as a permission failure with
        // nothing else to release.
        let capture_rx = match inner.capture.start().await {
            Ok(rx) => rx,
            Err(e) => {
                inner.last_error = Some(e.to_string());
                transition(&mut inner, ConversationStatus::Error);
                return Err(SessionError::Permission(e));
            }
        };

        // Playback context at its own rate, independent of capture.
        let sink_rx = match inner.sink.open().await {
            Ok(rx) => rx,
            Err(e) => {
                if let Err(stop_err) = inner.capture.stop().await {
                    warn!("Failed to release capture after sink error: {}", stop_err);
                }
                inner.last_error = Some(e.to_string());
                transition(&mut inner, ConversationStatus::Error);
                return Err(SessionError::Device(e));
            }
        };

        // Dial without holding the lock so stop() stays callable while the
        // connect is in flight. There is no connect timeout; a hung dial is
        // cancelled by the user stopping the session.
        drop(inner);

        let dialed = self.channel.open(self.channel_config()).await;

        let mut inner = self.inner.lock().await;

        if inner.run_id != run_id || inner.status != ConversationStatus::Connecting {
            // stop() won the race while we were dialing.
            info!(
                "Session {} cancelled during connect",
                self.config.conversation_id
            );
            if let Ok(conn) = dialed {
                if let Err(e) = conn.handle.close().await {
                    warn!("Failed to close orphaned channel: {}", e);
                }
            }
            return Ok(());
        }

        let conn = match dialed {
            Ok(conn) => conn,
            Err(e) => {
                inner.last_error = Some(e.to_string());
                teardown(&mut inner, ConversationStatus::Error).await;
                return Err(SessionError::Connect(e));
            }
        };

        inner.handle = Some(conn.handle);

        // Optional WAV archive of the captured side. Failure to create it
        // degrades to an unrecorded session rather than failing the run.
        inner.recorder = match &self.config.recording_path {
            Some(path) => {
                match SessionRecorder::create(path.clone(), self.config.capture_sample_rate) {
                    Ok(recorder) => Some(recorder),
                    Err(e) => {
                        warn!("Session recording disabled: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let driver = tokio::spawn(drive(
            Arc::clone(&self.inner),
            run_id,
            self.config.conversation_id.clone(),
            conn.events,
            capture_rx,
            sink_rx,
        ));
        inner.driver = Some(driver);

        Ok(())
    }

    /// End the current run and release every resource.
    ///
    /// Idempotent: callable in any state, any number of times. Each release
    /// step is guarded independently, so a partial failure never leaves a
    /// later resource held.
    pub async fn stop(&self) -> SessionStats {
        let mut inner = self.inner.lock().await;

        // Invalidate any in-flight dial and any stale driver events.
        inner.run_id = inner.run_id.wrapping_add(1);

        if inner.status == ConversationStatus::Idle {
            debug!("Session {} already idle", self.config.conversation_id);
            return stats_of(&inner);
        }

        info!("Stopping conversation session: {}", self.config.conversation_id);
        teardown(&mut inner, ConversationStatus::Idle).await;
        stats_of(&inner)
    }

    pub async fn status(&self) -> ConversationStatus {
        self.inner.lock().await.status
    }

    pub async fn stats(&self) -> SessionStats {
        stats_of(&*self.inner.lock().await)
    }

    /// Committed transcript turns, oldest first.
    pub async fn transcript(&self) -> Vec<TranscriptTurn> {
        self.inner.lock().await.transcript.turns().to_vec()
    }

    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            conversation_id: self.config.conversation_id.clone(),
            response_modality: ResponseModality::Audio,
            transcribe_input: self.config.transcribe_input,
            transcribe_output: self.config.transcribe_output,
            system_instruction: self.config.system_instruction.clone(),
            capture_sample_rate: self.config.capture_sample_rate,
            playback_sample_rate: self.config.playback_sample_rate,
        }
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        // Async teardown is not available here; abort the driver and let
        // each resource release itself on Drop (worker threads exit when
        // their shutdown senders drop, the recorder finalizes, the NATS
        // client disconnects). An explicit stop() remains the normal path.
        if let Ok(mut inner) = self.inner.try_lock() {
            if let Some(driver) = inner.driver.take() {
                driver.abort();
            }
        }
    }
}

/// The only place status mutates.
fn transition(inner: &mut Inner, next: ConversationStatus) {
    if inner.status != next {
        info!("Conversation status: {:?} -> {:?}", inner.status, next);
        inner.status = next;
    }
}

/// Release every session resource, each step guarded independently, then
/// land in `final_status`. Safe against resources that are already gone.
async fn teardown(inner: &mut Inner, final_status: ConversationStatus) {
    if let Some(handle) = inner.handle.take() {
        if let Err(e) = handle.close().await {
            warn!("Failed to close agent channel: {}", e);
        }
    }

    if let Err(e) = inner.capture.stop().await {
        warn!("Failed to stop capture: {}", e);
    }

    inner.scheduler.interrupt(&mut *inner.sink);

    if let Err(e) = inner.sink.close().await {
        warn!("Failed to close playback sink: {}", e);
    }

    if let Some(recorder) = inner.recorder.take() {
        if let Err(e) = recorder.finish() {
            warn!("Failed to finalize session recording: {}", e);
        }
    }

    if let Some(driver) = inner.driver.take() {
        driver.abort();
    }

    transition(inner, final_status);
}

fn stats_of(inner: &Inner) -> SessionStats {
    let duration_secs = inner
        .started_at
        .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0)
        .unwrap_or(0.0);

    SessionStats {
        status: inner.status,
        started_at: inner.started_at,
        duration_secs,
        chunks_sent: inner.chunks_sent,
        chunks_scheduled: inner.chunks_scheduled,
        turns_committed: inner.transcript.turns().len(),
        last_error: inner.last_error.clone(),
    }
}

/// One run's event loop: channel events, capture blocks, and playback
/// completions, serialized through the session lock.
async fn drive(
    inner: Arc<Mutex<Inner>>,
    run_id: u64,
    conversation_id: String,
    mut channel_rx: mpsc::Receiver<ChannelEvent>,
    mut capture_rx: mpsc::Receiver<CaptureBlock>,
    mut sink_rx: mpsc::Receiver<PlaybackEvent>,
) {
    // Capture is forwarded only once the remote confirms open, so audio is
    // never sent on an unconfirmed channel.
    let mut wired = false;

    loop {
        tokio::select! {
            event = channel_rx.recv() => {
                let mut guard = inner.lock().await;
                if guard.run_id != run_id {
                    break;
                }

                match event {
                    Some(ChannelEvent::Opened) => {
                        if guard.status == ConversationStatus::Connecting {
                            wired = true;
                            transition(&mut guard, ConversationStatus::Listening);
                        }
                    }
                    Some(ChannelEvent::Message(message)) => {
                        route_message(&mut guard, &message);
                    }
                    Some(ChannelEvent::Error(message)) => {
                        error!("Agent channel error on {}: {}", conversation_id, message);
                        guard.last_error = Some(message);
                        // This task is ending on its own; drop its handle so
                        // teardown does not abort a live teardown.
                        guard.driver = None;
                        teardown(&mut guard, ConversationStatus::Error).await;
                        break;
                    }
                    Some(ChannelEvent::Closed) | None => {
                        // Remote-initiated close is a neutral session end,
                        // not a failure.
                        info!("Agent closed session {}", conversation_id);
                        guard.driver = None;
                        teardown(&mut guard, ConversationStatus::Idle).await;
                        break;
                    }
                }
            }
            Some(block) = capture_rx.recv() => {
                if !wired {
                    continue;
                }
                let mut guard = inner.lock().await;
                if guard.run_id != run_id {
                    break;
                }
                forward_block(&mut guard, &block).await;
            }
            Some(PlaybackEvent::Finished(id)) = sink_rx.recv() => {
                let mut guard = inner.lock().await;
                if guard.run_id != run_id {
                    break;
                }
                if guard.scheduler.on_finished(id)
                    && guard.status == ConversationStatus::Speaking
                {
                    // The last scheduled chunk played out.
                    transition(&mut guard, ConversationStatus::Listening);
                }
            }
        }
    }
}

/// Encode one microphone block and hand it to the channel.
///
/// Fire-and-forget: a frame that fails to send is logged and dropped; the
/// session keeps running.
async fn forward_block(inner: &mut Inner, block: &CaptureBlock) {
    if !matches!(
        inner.status,
        ConversationStatus::Listening | ConversationStatus::Speaking
    ) {
        return;
    }

    let quantized = encode::quantize(&block.samples);

    if let Some(recorder) = &mut inner.recorder {
        if let Err(e) = recorder.write_block(&quantized) {
            warn!("Dropping session recording after write failure: {}", e);
            inner.recorder = None;
        }
    }

    let chunk = encode::encode_pcm(&quantized, block.sample_rate);

    if let Some(handle) = inner.handle.as_ref() {
        match handle.send_audio(chunk).await {
            Ok(()) => inner.chunks_sent += 1,
            Err(e) => warn!("Failed to send audio frame: {}", e),
        }
    }
}

/// Route one agent update to the transcript and the playback scheduler.
fn route_message(inner: &mut Inner, message: &ServerMessage) {
    if !matches!(
        inner.status,
        ConversationStatus::Listening | ConversationStatus::Speaking
    ) {
        debug!("Ignoring agent update outside an open session");
        return;
    }

    // Barge-in first: it invalidates everything queued.
    if message.interrupted {
        debug!(
            "Barge-in: clearing {} scheduled source(s)",
            inner.scheduler.active_count()
        );
        let was_active = inner.scheduler.is_active();
        inner.scheduler.interrupt(&mut *inner.sink);
        if was_active && inner.status == ConversationStatus::Speaking {
            transition(inner, ConversationStatus::Listening);
        }
    }

    if let Some(text) = &message.input_transcript {
        inner.transcript.append_fragment(Speaker::User, text);
    }

    if let Some(text) = &message.output_transcript {
        inner.transcript.append_fragment(Speaker::Agent, text);
    }

    if let Some(audio) = &message.audio {
        match base64::engine::general_purpose::STANDARD.decode(&audio.data) {
            Ok(pcm) => match inner.scheduler.enqueue(&mut *inner.sink, &pcm) {
                Ok(Some(_)) => {
                    inner.chunks_scheduled += 1;
                    transition(inner, ConversationStatus::Speaking);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to schedule agent audio: {}", e),
            },
            Err(e) => warn!("Failed to decode agent audio payload: {}", e),
        }
    }

    if message.turn_complete {
        let committed = inner.transcript.commit_turn();
        if committed > 0 {
            debug!("Committed {} transcript turn(s)", committed);
        }
    }
}
