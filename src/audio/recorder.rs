use anyhow::{bail, Context, Result};
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::analyser::AnalyserNode;
use super::backend::AudioFrame;

pub const CLIP_MIME: &str = "audio/wav";
pub const CLIP_FILE_NAME: &str = "clip.wav";

/// A finalized recording, ready for submission
#[derive(Debug, Clone)]
pub struct Clip {
    /// Encoded container bytes
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`
    pub mime: String,
    /// File name sent with the upload
    pub file_name: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel
    pub sample_count: usize,
}

impl Clip {
    /// Encode mono/interleaved PCM as a 16-bit WAV clip
    pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).context("Failed to start WAV clip")?;
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            writer.finalize().context("Failed to finalize WAV clip")?;
        }

        Ok(Self {
            bytes: cursor.into_inner(),
            mime: CLIP_MIME.to_string(),
            file_name: CLIP_FILE_NAME.to_string(),
            sample_rate,
            channels,
            sample_count: samples.len() / channels.max(1) as usize,
        })
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sample_count as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

/// Recorder handle
///
/// Reads frames straight from the microphone channel until stopped. Every
/// frame is also fed to the analyser, if one is attached. Stopping drains
/// whatever the microphone already delivered before the clip is encoded.
pub struct ClipRecorder {
    token: CancellationToken,
    task: Option<JoinHandle<Result<Clip>>>,
}

impl ClipRecorder {
    /// Start buffering frames from `frames`
    ///
    /// `sample_rate` and `channels` are used only if no frame arrives before
    /// the recorder is stopped; otherwise the first frame's format wins.
    pub fn start(frames: mpsc::Receiver<AudioFrame>, sample_rate: u32, channels: u16) -> Self {
        Self::spawn(frames, None, sample_rate, channels)
    }

    /// Like `start`, also pushing every frame into `analyser`
    pub fn with_analyser(
        frames: mpsc::Receiver<AudioFrame>,
        analyser: AnalyserNode,
        sample_rate: u32,
        channels: u16,
    ) -> Self {
        Self::spawn(frames, Some(analyser), sample_rate, channels)
    }

    fn spawn(
        mut frames: mpsc::Receiver<AudioFrame>,
        analyser: Option<AnalyserNode>,
        sample_rate: u32,
        channels: u16,
    ) -> Self {
        let token = CancellationToken::new();
        let stopped = token.clone();

        let task = tokio::spawn(async move {
            let mut take = Take::new(analyser);

            debug!("Recorder started");

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.cancelled() => break,
                    frame = frames.recv() => match frame {
                        Some(frame) => take.push(frame),
                        None => break,
                    },
                }
            }

            // Frames the microphone delivered before stop belong to the clip
            frames.close();
            let mut flushed = 0;
            while let Some(frame) = frames.recv().await {
                take.push(frame);
                flushed += 1;
            }
            if flushed > 0 {
                debug!("Flushed {} queued frames on stop", flushed);
            }

            let (rate, chans) = take.format.unwrap_or((sample_rate, channels));
            let clip = Clip::encode_wav(&take.samples, rate, chans)?;

            info!(
                "Recorder stopped: {:.1}s clip ({} bytes)",
                clip.duration().as_secs_f64(),
                clip.bytes.len()
            );

            Ok(clip)
        });

        Self {
            token,
            task: Some(task),
        }
    }

    /// Stop recording and take the finished clip
    pub async fn stop(&mut self) -> Result<Clip> {
        let Some(task) = self.task.take() else {
            bail!("recorder already stopped");
        };

        self.token.cancel();
        task.await.context("Recorder task panicked")?
    }

    pub fn is_recording(&self) -> bool {
        self.task.is_some()
    }
}

/// Samples gathered so far
struct Take {
    samples: Vec<i16>,
    format: Option<(u32, u16)>,
    analyser: Option<AnalyserNode>,
}

impl Take {
    fn new(analyser: Option<AnalyserNode>) -> Self {
        Self {
            samples: Vec::new(),
            format: None,
            analyser,
        }
    }

    fn push(&mut self, frame: AudioFrame) {
        if let Some(analyser) = &self.analyser {
            analyser.push_interleaved(&frame.samples, frame.channels);
        }
        self.format.get_or_insert((frame.sample_rate, frame.channels));
        self.samples.extend_from_slice(&frame.samples);
    }
}

impl Drop for ClipRecorder {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
