// Microphone backend on top of cpal
//
// cpal streams are not `Send` on every host, so the stream lives on a
// dedicated thread for its whole life. The thread reports whether the
// stream could be opened, then parks until `stop` asks it to drop the
// stream.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, BuildStreamError, PlayStreamError, SampleFormat, SupportedBufferSize};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::backend::{fold_channels, AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::AccessError;

/// Frames buffered between the device callback and the session
const FRAME_QUEUE: usize = 64;

/// Default-input-device backend
pub struct CpalBackend {
    config: AudioBackendConfig,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    capturing: bool,
}

/// Description of one input device
#[derive(Debug)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl CpalBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            stop_tx: None,
            thread: None,
            capturing: false,
        }
    }

    pub fn list_devices() -> Result<Vec<InputDeviceInfo>> {
        let host = cpal::default_host();
        let default_name = host
            .default_input_device()
            .and_then(|d| d.name().ok());

        let mut infos = Vec::new();
        for device in host.input_devices().context("Failed to enumerate input devices")? {
            let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
            let default_config = device.default_input_config().ok();

            infos.push(InputDeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                sample_rate: default_config.as_ref().map(|c| c.sample_rate().0),
                channels: default_config.as_ref().map(|c| c.channels()),
                name,
            });
        }

        Ok(infos)
    }
}

#[async_trait::async_trait]
impl AudioBackend for CpalBackend {
    async fn start(&mut self) -> std::result::Result<mpsc::Receiver<AudioFrame>, AccessError> {
        if self.capturing {
            return Err(AccessError::Backend("already capturing".to_string()));
        }

        info!("Requesting microphone access");

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("sonar-microphone".to_string())
            .spawn(move || {
                let stream = match open_stream(&config, frame_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let _ = ready_tx.send(Ok(()));

                // Either an explicit stop or the backend being dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| AccessError::Backend(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                self.capturing = true;
                info!("Microphone capture started");
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(AccessError::Backend(
                "microphone thread exited before reporting".to_string(),
            )),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        self.capturing = false;

        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("Failed to join microphone thread")?
                .map_err(|_| anyhow!("microphone thread panicked"))?;
            info!("Microphone capture stopped");
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "cpal default input"
    }
}

fn open_stream(
    config: &AudioBackendConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> std::result::Result<cpal::Stream, AccessError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(AccessError::NoDevice)?;

    let supported = device
        .default_input_config()
        .map_err(|e| AccessError::Backend(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();

    if sample_rate != config.target_sample_rate {
        info!(
            "Device rate {}Hz differs from preferred {}Hz; recording at device rate",
            sample_rate, config.target_sample_rate
        );
    }

    if channels != config.target_channels {
        info!(
            "Device has {} channels, delivering {}",
            channels,
            config.target_channels.min(channels).max(1)
        );
    }

    let mut stream_config: cpal::StreamConfig = supported.config();
    stream_config.buffer_size = buffer_size(config, sample_rate, supported.buffer_size());

    let target = config.target_channels;
    let stream = match supported.sample_format() {
        SampleFormat::F32 => build::<f32>(&device, &stream_config, target, frame_tx),
        SampleFormat::I16 => build::<i16>(&device, &stream_config, target, frame_tx),
        SampleFormat::U16 => build::<u16>(&device, &stream_config, target, frame_tx),
        other => Err(AccessError::Backend(format!(
            "unsupported sample format {other:?}"
        ))),
    }?;

    stream.play().map_err(map_play_error)?;

    info!("Opened input stream: {}Hz, {} channels", sample_rate, channels);

    Ok(stream)
}

/// Fixed buffer from the configured duration, kept inside what the device supports
fn buffer_size(
    config: &AudioBackendConfig,
    sample_rate: u32,
    supported: &SupportedBufferSize,
) -> BufferSize {
    let wanted = config.buffer_frames(sample_rate);
    match supported {
        SupportedBufferSize::Range { min, max } => BufferSize::Fixed(wanted.clamp(*min, *max)),
        SupportedBufferSize::Unknown => BufferSize::Default,
    }
}

fn build<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    target_channels: u16,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> std::result::Result<cpal::Stream, AccessError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    let started = Instant::now();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data
                    .iter()
                    .map(|&s| <f32 as cpal::Sample>::from_sample(s))
                    .collect();

                let (samples, channels) = fold_channels(&samples, channels, target_channels);
                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    channels,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };

                // A full queue means the consumer is behind; dropping keeps the callback real-time
                let _ = frame_tx.try_send(frame);
            },
            |err| warn!("Microphone stream error: {}", err),
            None,
        )
        .map_err(map_build_error)
}

fn map_build_error(err: BuildStreamError) -> AccessError {
    match err {
        BuildStreamError::DeviceNotAvailable => AccessError::NoDevice,
        BuildStreamError::BackendSpecific { err } => AccessError::PermissionDenied(err.description),
        other => AccessError::Backend(other.to_string()),
    }
}

fn map_play_error(err: PlayStreamError) -> AccessError {
    match err {
        PlayStreamError::DeviceNotAvailable => AccessError::NoDevice,
        other => AccessError::PermissionDenied(other.to_string()),
    }
}
