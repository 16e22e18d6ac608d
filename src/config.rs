use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub live: LiveConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

/// Settings for the streaming link to the conversational agent service.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    pub endpoint: String,
    pub model: String,
    /// Synthesized voice identifier requested at connect time
    pub voice: String,
    /// Seconds before an unanswered connection attempt is abandoned
    pub connect_timeout_secs: u64,
}

impl LiveConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://localhost:8443/live".to_string(),
            model: "live-native-audio".to_string(),
            voice: "Kore".to_string(),
            connect_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Capture sample rate the remote protocol requires
    pub capture_rate: u32,
    /// Playback/mix sample rate matching the agent's output format
    pub playback_rate: u32,
    /// Samples per capture block handed to the codec
    pub capture_block_size: usize,
    /// Duration of each recording chunk before rotation
    pub chunk_duration_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_rate: 16_000,
            playback_rate: 24_000,
            capture_block_size: 4096,
            chunk_duration_secs: 10,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
