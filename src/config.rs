use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Microphone capture rate in Hz. Independent of the playback rate.
    pub capture_sample_rate: u32,
    /// Speaker playback rate in Hz (the rate agent audio arrives at).
    pub playback_sample_rate: u32,
    /// Directory for per-session WAV archives.
    pub recordings_path: String,
    /// Archive captured microphone audio for each session.
    pub record_sessions: bool,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    pub nats_url: String,
    pub system_instruction: String,
    pub transcribe_input: bool,
    pub transcribe_output: bool,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
