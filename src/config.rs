use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub vad: VadTuning,
    pub server: ServerConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub frame_interval_ms: u64,
}

/// Voice activity detection calibration.
///
/// These are the empirically chosen values from `defaults`; override per
/// environment rather than editing code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadTuning {
    pub start_threshold: f32,
    pub stop_threshold: f32,
    pub silence_hold_ms: u32,
    pub max_record_ms: u32,
}

/// Backend endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the verification backend (join-token, verify-voice).
    pub api_url: String,
    /// URL of the real-time room the data channel connects to.
    pub room_url: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            frame_interval_ms: defaults::FRAME_INTERVAL_MS,
        }
    }
}

impl Default for VadTuning {
    fn default() -> Self {
        Self {
            start_threshold: defaults::START_THRESHOLD,
            stop_threshold: defaults::STOP_THRESHOLD,
            silence_hold_ms: defaults::SILENCE_HOLD_MS,
            max_record_ms: defaults::MAX_RECORD_MS,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            room_url: "ws://localhost:7880".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Reject threshold orderings that would break hysteresis.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.vad.stop_threshold >= self.vad.start_threshold {
            anyhow::bail!(
                "vad.stop_threshold ({}) must be strictly below vad.start_threshold ({})",
                self.vad.stop_threshold,
                self.vad.start_threshold
            );
        }
        if self.vad.max_record_ms <= self.vad.silence_hold_ms {
            anyhow::bail!(
                "vad.max_record_ms ({}) must exceed vad.silence_hold_ms ({})",
                self.vad.max_record_ms,
                self.vad.silence_hold_ms
            );
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXGATE_API_URL → server.api_url
    /// - VOXGATE_ROOM_URL → server.room_url
    /// - VOXGATE_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("VOXGATE_API_URL")
            && !url.is_empty()
        {
            self.server.api_url = url;
        }

        if let Ok(url) = std::env::var("VOXGATE_ROOM_URL")
            && !url.is_empty()
        {
            self.server.room_url = url;
        }

        if let Ok(device) = std::env::var("VOXGATE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxgate/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxgate")
            .join("config.toml")
    }

    #[cfg(not(feature = "cli"))]
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.toml")
    }
}
