// Speaker playback sink.
//
// Scheduled sources are mixed in the cpal output callback against a
// sample-counter clock, so `current_time` is driven by the audio hardware
// rather than the wall clock. The stream itself lives on a worker thread
// (cpal streams are not Send); schedule/cancel only touch shared state.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::playback::{PlaybackEvent, PlaybackSink, SourceId};
use super::AudioError;

struct ActiveSource {
    id: SourceId,
    samples: Vec<i16>,
    start_frame: u64,
    cursor: usize,
}

struct OutputShared {
    sources: Vec<ActiveSource>,
    frames_elapsed: u64,
    events: Option<mpsc::Sender<PlaybackEvent>>,
}

struct OutputWorker {
    shutdown: std_mpsc::Sender<()>,
    handle: std::thread::JoinHandle<()>,
}

/// cpal-based playback sink.
pub struct DevicePlaybackSink {
    sample_rate: u32,
    shared: Arc<Mutex<OutputShared>>,
    worker: Option<OutputWorker>,
}

impl DevicePlaybackSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            shared: Arc::new(Mutex::new(OutputShared {
                sources: Vec::new(),
                frames_elapsed: 0,
                events: None,
            })),
            worker: None,
        }
    }

    fn lock_shared(&self) -> std::sync::MutexGuard<'_, OutputShared> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl PlaybackSink for DevicePlaybackSink {
    async fn open(&mut self) -> Result<mpsc::Receiver<PlaybackEvent>, AudioError> {
        if self.worker.is_some() {
            return Err(AudioError::AlreadyRunning);
        }

        info!("Opening playback sink at {}Hz", self.sample_rate);

        let (event_tx, event_rx) = mpsc::channel(64);
        {
            let mut shared = self.lock_shared();
            shared.sources.clear();
            shared.frames_elapsed = 0;
            shared.events = Some(event_tx);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel();

        let sample_rate = self.sample_rate;
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::spawn(move || {
            run_output(sample_rate, shared, ready_tx, shutdown_rx);
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioError::Stream(
                    "playback worker exited during startup".into(),
                ));
            }
        }

        self.worker = Some(OutputWorker {
            shutdown: shutdown_tx,
            handle,
        });

        info!("Playback sink opened");

        Ok(event_rx)
    }

    fn current_time(&self) -> f64 {
        let shared = self.lock_shared();
        shared.frames_elapsed as f64 / self.sample_rate as f64
    }

    fn schedule(
        &mut self,
        id: SourceId,
        samples: Vec<i16>,
        start_at: f64,
    ) -> Result<(), AudioError> {
        if self.worker.is_none() {
            return Err(AudioError::Stream("playback sink is not open".into()));
        }

        let start_frame = (start_at * self.sample_rate as f64).round() as u64;
        let mut shared = self.lock_shared();
        shared.sources.push(ActiveSource {
            id,
            samples,
            start_frame,
            cursor: 0,
        });
        Ok(())
    }

    fn cancel(&mut self, id: SourceId) -> Result<(), AudioError> {
        let mut shared = self.lock_shared();
        shared.sources.retain(|src| src.id != id);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AudioError> {
        if let Some(worker) = self.worker.take() {
            info!("Closing playback sink");
            let _ = worker.shutdown.send(());
            if worker.handle.join().is_err() {
                warn!("Playback worker panicked during shutdown");
            }
        }

        let mut shared = self.lock_shared();
        shared.sources.clear();
        shared.events = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "cpal speaker"
    }
}

/// Worker-thread body: owns the cpal output stream for one run.
fn run_output(
    sample_rate: u32,
    shared: Arc<Mutex<OutputShared>>,
    ready_tx: oneshot::Sender<Result<(), AudioError>>,
    shutdown_rx: std_mpsc::Receiver<()>,
) {
    let stream = match open_output_stream(sample_rate, shared) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    let _ = shutdown_rx.recv();
}

fn open_output_stream(
    sample_rate: u32,
    shared: Arc<Mutex<OutputShared>>,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

    info!(
        "Audio output device: {}",
        device.name().unwrap_or_else(|_| "unknown".into())
    );

    let ranges = device
        .supported_output_configs()
        .map_err(|e| AudioError::Stream(e.to_string()))?;

    let mut selected = None;
    for range in ranges {
        if range.min_sample_rate().0 <= sample_rate && range.max_sample_rate().0 >= sample_rate {
            selected = Some(range.with_sample_rate(cpal::SampleRate(sample_rate)));
            break;
        }
    }

    let supported = selected.ok_or_else(|| {
        AudioError::Unsupported(format!("output device does not support {}Hz", sample_rate))
    })?;

    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let err_fn = |err: cpal::StreamError| error!("Playback stream error: {}", err);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    let mut guard = match shared.lock() {
                        Ok(g) => g,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    render(&mut guard, frames, |i, value| {
                        let f = value as f32 / 32768.0;
                        for ch in 0..channels {
                            data[i * channels + ch] = f;
                        }
                    });
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?,
        cpal::SampleFormat::I16 => device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    let mut guard = match shared.lock() {
                        Ok(g) => g,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    render(&mut guard, frames, |i, value| {
                        for ch in 0..channels {
                            data[i * channels + ch] = value;
                        }
                    });
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?,
        other => {
            return Err(AudioError::Unsupported(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    };

    Ok(stream)
}

/// Mix all due sources into `frames` output frames.
///
/// Sources whose start frame is still in the future contribute silence;
/// overlapping sources are summed with clipping. Sources that reach their
/// end are dropped and reported as finished.
fn render(shared: &mut OutputShared, frames: usize, mut write: impl FnMut(usize, i16)) {
    let base = shared.frames_elapsed;

    for i in 0..frames {
        let t = base + i as u64;
        let mut acc: i32 = 0;

        for src in shared.sources.iter_mut() {
            if src.start_frame <= t && src.cursor < src.samples.len() {
                acc += src.samples[src.cursor] as i32;
                src.cursor += 1;
            }
        }

        let value = acc.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        write(i, value);
    }

    shared.frames_elapsed = base + frames as u64;

    let events = shared.events.clone();
    shared.sources.retain(|src| {
        if src.cursor >= src.samples.len() {
            if let Some(tx) = &events {
                let _ = tx.try_send(PlaybackEvent::Finished(src.id));
            }
            false
        } else {
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_with(sources: Vec<ActiveSource>) -> (OutputShared, mpsc::Receiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (
            OutputShared {
                sources,
                frames_elapsed: 0,
                events: Some(tx),
            },
            rx,
        )
    }

    fn collect(out: &mut Vec<i16>) -> impl FnMut(usize, i16) + '_ {
        move |_i, v| out.push(v)
    }

    #[test]
    fn test_render_plays_source_from_start_frame() {
        let (mut shared, _rx) = shared_with(vec![ActiveSource {
            id: SourceId(0),
            samples: vec![100, 200],
            start_frame: 2,
            cursor: 0,
        }]);

        let mut out = Vec::new();
        render(&mut shared, 4, collect(&mut out));

        assert_eq!(out, vec![0, 0, 100, 200]);
        assert_eq!(shared.frames_elapsed, 4);
    }

    #[test]
    fn test_render_reports_finished_and_drops_source() {
        let (mut shared, mut rx) = shared_with(vec![ActiveSource {
            id: SourceId(7),
            samples: vec![1, 2, 3],
            start_frame: 0,
            cursor: 0,
        }]);

        let mut out = Vec::new();
        render(&mut shared, 4, collect(&mut out));

        assert!(shared.sources.is_empty());
        assert_eq!(rx.try_recv().unwrap(), PlaybackEvent::Finished(SourceId(7)));
    }

    #[test]
    fn test_render_sums_overlapping_sources_with_clipping() {
        let (mut shared, _rx) = shared_with(vec![
            ActiveSource {
                id: SourceId(0),
                samples: vec![i16::MAX, 100],
                start_frame: 0,
                cursor: 0,
            },
            ActiveSource {
                id: SourceId(1),
                samples: vec![1000, 100],
                start_frame: 0,
                cursor: 0,
            },
        ]);

        let mut out = Vec::new();
        render(&mut shared, 2, collect(&mut out));

        assert_eq!(out, vec![i16::MAX, 200]);
    }

    #[test]
    fn test_render_clock_advances_without_sources() {
        let (mut shared, _rx) = shared_with(Vec::new());

        let mut out = Vec::new();
        render(&mut shared, 480, collect(&mut out));
        render(&mut shared, 480, collect(&mut out));

        assert_eq!(shared.frames_elapsed, 960);
        assert!(out.iter().all(|&v| v == 0));
    }
}
