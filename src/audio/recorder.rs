// Per-session WAV archive of captured microphone audio.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};

/// Metadata for a finished recording.
#[derive(Debug, Clone)]
pub struct RecordingInfo {
    pub file_path: PathBuf,
    pub sample_rate: u32,
    pub sample_count: usize,
}

impl RecordingInfo {
    pub fn duration_secs(&self) -> f64 {
        self.sample_count as f64 / self.sample_rate as f64
    }
}

/// Writes one session's captured audio to a mono 16-bit WAV file.
pub struct SessionRecorder {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    info: RecordingInfo,
}

impl SessionRecorder {
    pub fn create(file_path: PathBuf, sample_rate: u32) -> Result<Self> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).context("Failed to create recordings directory")?;
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        info!("Session recording to {:?} at {}Hz", file_path, sample_rate);

        Ok(Self {
            writer: Some(writer),
            info: RecordingInfo {
                file_path,
                sample_rate,
                sample_count: 0,
            },
        })
    }

    pub fn write_block(&mut self, samples: &[i16]) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            self.info.sample_count += samples.len();
        }

        Ok(())
    }

    pub fn finish(mut self) -> Result<RecordingInfo> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        info!(
            "Session recording complete: {:?} ({:.1}s)",
            self.info.file_path,
            self.info.duration_secs()
        );

        Ok(self.info.clone())
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_writes_and_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.wav");

        let mut recorder = SessionRecorder::create(path.clone(), 16000).unwrap();
        recorder.write_block(&[0, 100, -100, 32767]).unwrap();
        recorder.write_block(&[1, 2]).unwrap();
        let info = recorder.finish().unwrap();

        assert_eq!(info.sample_count, 6);

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);

        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 100, -100, 32767, 1, 2]);
    }

    #[test]
    fn test_recorder_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("take.wav");

        let recorder = SessionRecorder::create(path.clone(), 24000).unwrap();
        drop(recorder); // finalized by the Drop guard

        assert!(path.exists());
    }
}
