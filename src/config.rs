use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::audio::AudioBackendConfig;
use crate::palette::Palette;
use crate::session::SessionConfig;
use crate::visualizer::VisualizerConfig;

/// Default location of the optional config file (extension resolved by `config`)
pub const DEFAULT_CONFIG_PATH: &str = "config/sonar";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub visualizer: VisualizerConfig,
    pub palette: PaletteConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub ready_poll_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 20,
            ready_poll_secs: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Countdown length before auto-stop
    pub duration_secs: u32,
    pub sample_rate: u32,
    /// 1 records mono; more keeps the device's channels
    pub channels: u16,
    /// Device buffer length
    pub buffer_ms: u64,
    pub fft_size: usize,
    /// Redraw period of the sampling loop
    pub frame_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            duration_secs: 7,
            sample_rate: 44100,
            channels: 1,
            buffer_ms: 100,
            fft_size: 128,
            frame_interval_ms: 16,
        }
    }
}

impl CaptureConfig {
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            duration_secs: self.duration_secs.max(1),
            fft_size: self.fft_size,
            frame_interval: Duration::from_millis(self.frame_interval_ms.max(1)),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn backend(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.sample_rate,
            target_channels: self.channels.max(1),
            buffer_duration_ms: self.buffer_ms.max(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    /// RGB used until (or unless) artwork yields a colour
    pub fallback: [u8; 3],
    pub fetch_timeout_secs: u64,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        let Palette { r, g, b } = Palette::BRAND;
        Self {
            fallback: [r, g, b],
            fetch_timeout_secs: 10,
        }
    }
}

impl PaletteConfig {
    pub fn fallback(&self) -> Palette {
        Palette::from(self.fallback)
    }
}

impl Config {
    /// Defaults, then the file at `path` if present, then `SONAR__*` env vars
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SONAR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {path}"))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
