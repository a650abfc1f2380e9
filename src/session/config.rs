use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Length of the countdown before the automatic stop
    /// Default: 7 seconds
    pub duration_secs: u32,

    /// FFT window of the analysis node (power of two)
    pub fft_size: usize,

    /// Period of the visualizer sampling loop
    pub frame_interval: Duration,

    /// Fallback clip format, used when no frame arrives
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: 7,
            fft_size: 128,
            frame_interval: Duration::from_millis(16), // ~60 fps
            sample_rate: 44100,
            channels: 1,
        }
    }
}
