// Fakes shared by the integration tests

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use sonar::audio::{AudioBackend, AudioFrame};
use sonar::{AccessError, Clip, Match, RecognitionError, Recognizer};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Release calls observed on a `FakeBackend`
#[derive(Clone, Default)]
pub struct BackendProbe {
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub live: Arc<AtomicBool>,
    /// Frames still unread by the session when the microphone was stopped
    pub unread_at_stop: Arc<AtomicUsize>,
}

impl BackendProbe {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn unread_at_stop(&self) -> usize {
        self.unread_at_stop.load(Ordering::SeqCst)
    }
}

/// Microphone that hands out a few frames of a tone, or refuses access
pub struct FakeBackend {
    probe: BackendProbe,
    deny: Option<AccessError>,
    frames: usize,
    fail_stop: bool,
    tx: Option<mpsc::Sender<AudioFrame>>,
}

impl FakeBackend {
    pub fn new(probe: BackendProbe) -> Self {
        Self {
            probe,
            deny: None,
            frames: 5,
            fail_stop: false,
            tx: None,
        }
    }

    pub fn denying(probe: BackendProbe, err: AccessError) -> Self {
        Self {
            deny: Some(err),
            ..Self::new(probe)
        }
    }

    /// Releases the device but reports an error from `stop`
    pub fn failing_stop(probe: BackendProbe) -> Self {
        Self {
            fail_stop: true,
            ..Self::new(probe)
        }
    }

    pub fn silent(probe: BackendProbe) -> Self {
        Self {
            frames: 0,
            ..Self::new(probe)
        }
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, AccessError> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.deny.clone() {
            return Err(err);
        }

        let (tx, rx) = mpsc::channel(64);
        for i in 0..self.frames {
            let samples = (0..4410)
                .map(|n| (((n as f32) * 0.063).sin() * 8000.0) as i16)
                .collect();
            tx.try_send(AudioFrame {
                samples,
                sample_rate: 44100,
                channels: 1,
                timestamp_ms: i as u64 * 100,
            })
            .expect("queue has room");
        }

        self.tx = Some(tx);
        self.probe.live.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.tx.take() {
            let unread = tx.max_capacity() - tx.capacity();
            self.probe.unread_at_stop.store(unread, Ordering::SeqCst);
        }
        self.probe.live.store(false, Ordering::SeqCst);

        if self.fail_stop {
            bail!("track refused to stop");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.tx.is_some()
    }

    fn name(&self) -> &str {
        "fake"
    }
}

type Outcome = Box<dyn Fn() -> Result<Match, RecognitionError> + Send + Sync>;

/// Recognizer answering after `delay` with a fixed outcome
pub struct FakeRecognizer {
    outcome: Outcome,
    delay: Duration,
    pub calls: AtomicUsize,
    pub last_clip_bytes: AtomicUsize,
}

impl FakeRecognizer {
    pub fn matching(title: &str) -> Arc<Self> {
        let title = title.to_string();
        Self::with(Box::new(move || Ok(sample_match(&title))), Duration::ZERO)
    }

    pub fn failing(make: fn() -> RecognitionError) -> Arc<Self> {
        Self::with(Box::new(move || Err(make())), Duration::ZERO)
    }

    pub fn slow(title: &str, delay: Duration) -> Arc<Self> {
        let title = title.to_string();
        Self::with(Box::new(move || Ok(sample_match(&title))), delay)
    }

    fn with(outcome: Outcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay,
            calls: AtomicUsize::new(0),
            last_clip_bytes: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn submit(&self, clip: Clip) -> Result<Match, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_clip_bytes.store(clip.bytes.len(), Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.outcome)()
    }
}

pub fn sample_match(title: &str) -> Match {
    Match {
        id: Uuid::new_v4(),
        title: title.to_string(),
        artist: "Daft Punk".to_string(),
        album: Some("Discovery".to_string()),
        cover: None,
        preview: None,
        release: Some("2001-03-12".to_string()),
        spotify_url: None,
        popularity: Some(84),
        confidence: Some(0.91),
        align: Some(1200),
        identified_at: Utc::now(),
    }
}
