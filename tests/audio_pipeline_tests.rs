// Integration tests for the capture pipeline pieces
//
// Frames in, analyser snapshots and a WAV clip out.

use anyhow::Result;
use sonar::audio::{downmix, fold_channels, AudioBackendConfig, AudioBackendFactory, AudioFrame};
use sonar::visualizer::ring;
use sonar::{AnalyserNode, Clip, ClipRecorder, FrequencySampler, VisualizerConfig};
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::mpsc;

fn tone(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<i16> {
    (0..len)
        .map(|n| {
            let t = n as f32 / sample_rate as f32;
            ((t * freq * std::f32::consts::TAU).sin() * amplitude) as i16
        })
        .collect()
}

fn frame(samples: Vec<i16>, timestamp_ms: u64) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate: 44100,
        channels: 1,
        timestamp_ms,
    }
}

#[test]
fn test_backend_buffer_follows_duration() {
    let config = AudioBackendConfig::default();
    assert_eq!(config.buffer_frames(44100), 4410, "100ms at 44.1kHz");
    assert_eq!(config.buffer_frames(48000), 4800);

    let tiny = AudioBackendConfig {
        buffer_duration_ms: 0,
        ..AudioBackendConfig::default()
    };
    assert_eq!(tiny.buffer_frames(44100), 1, "never a zero-length buffer");
}

#[test]
fn test_clip_duration_counts_frames_not_samples() -> Result<()> {
    let mono = Clip::encode_wav(&vec![0i16; 4410], 44100, 1)?;
    assert_eq!(mono.duration(), Duration::from_millis(100));

    // Interleaved stereo: twice the samples for the same length
    let stereo = Clip::encode_wav(&vec![0i16; 8820], 44100, 2)?;
    assert_eq!(stereo.sample_count, 4410);
    assert_eq!(stereo.duration(), Duration::from_millis(100));
    Ok(())
}

#[test]
fn test_fold_channels_honours_target() {
    let interleaved = [0.5, -0.5, 1.0, 1.0];

    let (mono, channels) = fold_channels(&interleaved, 2, 1);
    assert_eq!((mono.len(), channels), (2, 1));

    let (stereo, channels) = fold_channels(&interleaved, 2, 2);
    assert_eq!((stereo.len(), channels), (4, 2));
}

#[test]
fn test_downmix_stereo_averages_channels() {
    // Interleaved [L, R, L, R]
    let mono = downmix(&[0.5, -0.5, 1.0, 1.0], 2);

    assert_eq!(mono.len(), 2);
    assert_eq!(mono[0], 0);
    assert_eq!(mono[1], i16::MAX);
}

#[cfg(not(feature = "microphone"))]
#[test]
fn test_factory_without_microphone_support_fails() {
    assert!(AudioBackendFactory::create(AudioBackendConfig::default()).is_err());
}

#[tokio::test]
async fn test_recorder_produces_readable_wav() -> Result<()> {
    let (tx, rx) = mpsc::channel(16);
    let mut recorder = ClipRecorder::start(rx, 44100, 1);

    for i in 0..10 {
        tx.send(frame(tone(440.0, 12000.0, 44100, 4410), i * 100)).await?;
    }

    let clip = recorder.stop().await?;
    assert_eq!(clip.mime, "audio/wav");
    assert_eq!(clip.file_name, "clip.wav");
    assert_eq!(clip.sample_count, 44100);
    assert!((clip.duration().as_secs_f64() - 1.0).abs() < 1e-6);

    let reader = hound::WavReader::new(Cursor::new(clip.bytes))?;
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 44100);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len(), 44100);

    assert!(recorder.stop().await.is_err(), "second stop is rejected");
    Ok(())
}

#[tokio::test]
async fn test_tone_lights_up_the_ring() -> Result<()> {
    let analyser = AnalyserNode::new(128);
    let sampler = FrequencySampler::new(analyser.clone());
    let config = VisualizerConfig::default();

    let resting = ring(&sampler.sample(), &config);
    assert!(resting.iter().all(|bar| bar.height == config.min_height));

    // 2756 Hz at 44.1 kHz lands on bin 8 of a 128-point FFT; kept quiet
    // enough that the neighbouring bins do not saturate too
    for _ in 0..8 {
        analyser.push_samples(&tone(2756.25, 1000.0, 44100, 128));
        sampler.sample();
    }

    let snapshot = sampler.sample();
    let bars = ring(&snapshot, &config);
    let loudest = (0..bars.len())
        .max_by(|&a, &b| bars[a].height.total_cmp(&bars[b].height))
        .expect("non-empty ring");
    assert_eq!(loudest, 8);
    assert!(bars[8].opacity > config.min_opacity);

    analyser.close()?;
    assert!(sampler.sample().bins().iter().all(|&b| b == 0));
    Ok(())
}
