// Microphone capture backend.
//
// The cpal stream is owned by a dedicated worker thread (cpal streams are
// not Send); captured blocks cross into async code over an mpsc channel.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc as std_mpsc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::AudioError;

/// One audio-processing callback's worth of microphone samples.
///
/// Samples are mono f32 in [-1.0, 1.0] at the backend's configured rate.
#[derive(Debug, Clone)]
pub struct CaptureBlock {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Microphone capture trait.
///
/// The session controller receives its capture capability through this
/// interface at construction; it never touches device state directly.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Open the device and start capturing.
    ///
    /// Returns a channel receiver that will receive capture blocks.
    /// Denied or missing microphone access surfaces here.
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureBlock>, AudioError>;

    /// Stop capturing and release the device. Safe to call when idle.
    async fn stop(&mut self) -> Result<(), AudioError>;

    /// Whether the backend is currently capturing.
    fn is_capturing(&self) -> bool;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// cpal-based microphone backend.
pub struct DeviceCaptureBackend {
    sample_rate: u32,
    worker: Option<CaptureWorker>,
}

struct CaptureWorker {
    shutdown: std_mpsc::Sender<()>,
    handle: std::thread::JoinHandle<()>,
}

impl DeviceCaptureBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            worker: None,
        }
    }
}

#[async_trait]
impl CaptureBackend for DeviceCaptureBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureBlock>, AudioError> {
        if self.worker.is_some() {
            return Err(AudioError::AlreadyRunning);
        }

        info!("Starting microphone capture at {}Hz", self.sample_rate);

        let (block_tx, block_rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel();

        let sample_rate = self.sample_rate;
        let handle = std::thread::spawn(move || {
            run_capture(sample_rate, block_tx, ready_tx, shutdown_rx);
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
                    "capture worker exited during startup".into(),
                ));
            }
        }

        self.worker = Some(CaptureWorker {
            shutdown: shutdown_tx,
            handle,
        });

        info!("Microphone capture started");

        Ok(block_rx)
    }

    async fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(worker) = self.worker.take() {
            info!("Stopping microphone capture");
            let _ = worker.shutdown.send(());
            if worker.handle.join().is_err() {
                warn!("Capture worker panicked during shutdown");
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

/// Worker-thread body: owns the cpal stream for the lifetime of one run.
fn run_capture(
    sample_rate: u32,
    block_tx: mpsc::Sender<CaptureBlock>,
    ready_tx: oneshot::Sender<Result<(), AudioError>>,
    shutdown_rx: std_mpsc::Receiver<()>,
) {
    let stream = match open_input_stream(sample_rate, block_tx) {
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

    // Park until stop; dropping the stream releases the device.
    let _ = shutdown_rx.recv();
}

fn open_input_stream(
    sample_rate: u32,
    block_tx: mpsc::Sender<CaptureBlock>,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(AudioError::NoDevice)?;

    info!(
        "Audio input device: {}",
        device.name().unwrap_or_else(|_| "unknown".into())
    );

    // Find a supported config covering the requested rate.
    let ranges = device
        .supported_input_configs()
        .map_err(|e| AudioError::Stream(e.to_string()))?;

    let mut selected = None;
    for range in ranges {
        if range.min_sample_rate().0 <= sample_rate && range.max_sample_rate().0 >= sample_rate {
            selected = Some(range.with_sample_rate(cpal::SampleRate(sample_rate)));
            break;
        }
    }

    let supported = selected.ok_or_else(|| {
        AudioError::Unsupported(format!("input device does not support {}Hz", sample_rate))
    })?;

    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let err_fn = |err: cpal::StreamError| error!("Capture stream error: {}", err);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let block = CaptureBlock {
                        samples: downmix(data, channels),
                        sample_rate,
                    };
                    // Lossy on backpressure; dropping a block beats stalling
                    // the audio thread.
                    let _ = block_tx.try_send(block);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?,
        cpal::SampleFormat::I16 => device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let as_f32: Vec<f32> =
                        data.iter().map(|&s| s as f32 / 32768.0).collect();
                    let block = CaptureBlock {
                        samples: downmix(&as_f32, channels),
                        sample_rate,
                    };
                    let _ = block_tx.try_send(block);
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

/// Average interleaved channels down to mono.
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }

    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_mono_passthrough() {
        let data = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix(&data, 1), data);
    }

    #[test]
    fn test_downmix_stereo_averages() {
        let data = vec![0.2, 0.4, -0.6, -0.2];
        let mono = downmix(&data, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!((mono[1] + 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_capture_block_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CaptureBlock>();
    }
}
