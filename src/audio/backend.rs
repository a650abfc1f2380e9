use anyhow::Result;
use tokio::sync::mpsc;

use crate::error::AccessError;

/// Audio sample data (16-bit PCM, mono after downmix)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Preferred sample rate; the device rate wins when it cannot be honoured
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 44100,
            target_channels: 1,
            buffer_duration_ms: 100,
        }
    }
}

/// Microphone capture backend
///
/// `start` is the permission request: it either hands back a live stream of
/// frames or reports why access was refused. `stop` stops every live track
/// and closes the frame channel. It must be safe to call when nothing was
/// started.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Acquire the microphone and start capturing
    async fn start(&mut self) -> std::result::Result<mpsc::Receiver<AudioFrame>, AccessError>;

    /// Stop all live tracks
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create the default microphone backend for this build
    pub fn create(config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        #[cfg(feature = "microphone")]
        {
            Ok(Box::new(super::microphone::CpalBackend::new(config)))
        }

        #[cfg(not(feature = "microphone"))]
        {
            let _ = config;
            anyhow::bail!("sonar was built without microphone support (enable the `microphone` feature)")
        }
    }
}

impl AudioBackendConfig {
    /// Device buffer length in frames for `sample_rate`
    pub fn buffer_frames(&self, sample_rate: u32) -> u32 {
        (sample_rate as u64 * self.buffer_duration_ms / 1000).clamp(1, u32::MAX as u64) as u32
    }
}

/// Convert interleaved float samples into the requested channel layout
///
/// A mono target (or a mono device) is downmixed; otherwise the device's
/// interleaved layout is kept. Returns the samples and their channel count.
pub fn fold_channels(
    samples: &[f32],
    device_channels: u16,
    target_channels: u16,
) -> (Vec<i16>, u16) {
    if target_channels <= 1 || device_channels <= 1 {
        return (downmix(samples, device_channels), 1);
    }

    let pcm = samples
        .iter()
        .map(|&s| (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect();
    (pcm, device_channels)
}

/// Fold interleaved float samples into mono i16 by averaging channels
pub fn downmix(samples: &[f32], channels: u16) -> Vec<i16> {
    let channels = channels.max(1) as usize;

    samples
        .chunks(channels)
        .map(|frame| {
            let mean = frame.iter().sum::<f32>() / frame.len() as f32;
            (mean * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_mono_passthrough() {
        let mono = downmix(&[0.0, 0.5, -0.5], 1);
        assert_eq!(mono, vec![0, 16383, -16383]);
    }

    #[test]
    fn test_downmix_stereo_averages_channels() {
        let mono = downmix(&[1.0, 0.0, -1.0, -1.0], 2);
        assert_eq!(mono.len(), 2);
        assert_eq!(mono[0], 16383);
        assert_eq!(mono[1], -i16::MAX);
    }

    #[test]
    fn test_fold_channels_keeps_stereo_when_asked() {
        let (pcm, channels) = fold_channels(&[0.5, -0.5, 1.0, 0.0], 2, 2);
        assert_eq!(channels, 2);
        assert_eq!(pcm, vec![16383, -16383, i16::MAX, 0]);

        let (mono, channels) = fold_channels(&[0.5, -0.5, 1.0, 0.0], 2, 1);
        assert_eq!(channels, 1);
        assert_eq!(mono, vec![0, 16383]);
    }

    #[test]
    fn test_downmix_clips_out_of_range_input() {
        let mono = downmix(&[2.0, -3.0], 1);
        assert_eq!(mono, vec![i16::MAX, i16::MIN]);
    }
}
