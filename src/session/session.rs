use super::config::SessionConfig;
use super::gate::{MicrophoneGate, MicrophoneLease};
use super::state::{CaptureState, SessionEvent};
use crate::audio::{
    AnalyserNode, AudioBackend, Clip, ClipRecorder, FrequencySampler, FrequencySnapshot,
    SamplingLoop,
};
use crate::clock::{Clock, TimerHandle};
use crate::error::{FailureKind, SessionError};
use crate::history::SessionHistory;
use crate::recognition::Recognizer;
use crate::track::Match;
use anyhow::{anyhow, Result};
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// One microphone capture, from permission request to a match or a failure
///
/// Cheap to clone; clones drive the same session. Operations are serialized
/// on an internal lock, so `cancel` issued while `start` is still waiting on
/// the microphone applies as soon as access settles.
#[derive(Clone)]
pub struct CaptureSession {
    shared: Arc<Shared>,
}

struct Shared {
    id: Uuid,
    config: SessionConfig,
    recognizer: Arc<dyn Recognizer>,
    history: SessionHistory,
    gate: MicrophoneGate,
    state: watch::Sender<CaptureState>,
    countdown: watch::Sender<u32>,
    snapshots: watch::Sender<FrequencySnapshot>,
    events: broadcast::Sender<SessionEvent>,
    core: Mutex<Core>,
}

/// Resources owned by the session while it runs
struct Core {
    backend: Box<dyn AudioBackend>,
    lease: Option<MicrophoneLease>,
    analyser: Option<AnalyserNode>,
    recorder: Option<ClipRecorder>,
    sampling: Option<SamplingLoop>,
    countdown: Option<TimerHandle>,
    submission: Option<CancellationToken>,
    /// Bumped on every start and on cancel; late results from an older
    /// generation are discarded
    generation: u64,
    last_match: Option<Arc<Match>>,
}

impl CaptureSession {
    pub fn new(
        config: SessionConfig,
        backend: Box<dyn AudioBackend>,
        recognizer: Arc<dyn Recognizer>,
        history: SessionHistory,
        gate: MicrophoneGate,
    ) -> Self {
        let id = Uuid::new_v4();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let bins = AnalyserNode::new(config.fft_size).frequency_bin_count();

        info!("Creating capture session {} ({})", id, backend.name());

        Self {
            shared: Arc::new(Shared {
                id,
                state: watch::Sender::new(CaptureState::Idle),
                countdown: watch::Sender::new(config.duration_secs),
                snapshots: watch::Sender::new(FrequencySnapshot::silent(bins)),
                events,
                config,
                recognizer,
                history,
                gate,
                core: Mutex::new(Core {
                    backend,
                    lease: None,
                    analyser: None,
                    recorder: None,
                    sampling: None,
                    countdown: None,
                    submission: None,
                    generation: 0,
                    last_match: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn state(&self) -> CaptureState {
        *self.shared.state.borrow()
    }

    /// Seconds left on the countdown
    pub fn remaining(&self) -> u32 {
        *self.shared.countdown.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<CaptureState> {
        self.shared.state.subscribe()
    }

    pub fn watch_countdown(&self) -> watch::Receiver<u32> {
        self.shared.countdown.subscribe()
    }

    /// Latest frequency snapshot for the visualizer
    pub fn snapshots(&self) -> watch::Receiver<FrequencySnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// The analysis node while listening
    pub async fn analyser(&self) -> Option<AnalyserNode> {
        self.shared.core.lock().await.analyser.clone()
    }

    pub async fn last_match(&self) -> Option<Arc<Match>> {
        self.shared.core.lock().await.last_match.clone()
    }

    /// Request the microphone and start listening
    ///
    /// On success the session is `Listening` and the countdown runs. A denied
    /// or missing microphone leaves the session `Failed` and is also
    /// returned as an error.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut core = self.shared.core.lock().await;

        let state = self.state();
        if state != CaptureState::Idle {
            warn!("Session {} already started ({})", self.shared.id, state);
            return Err(SessionError::AlreadyStarted(state));
        }

        let Some(lease) = self.shared.gate.try_acquire() else {
            warn!("Microphone busy, rejecting session {}", self.shared.id);
            return Err(SessionError::Busy);
        };

        core.lease = Some(lease);
        core.generation += 1;
        self.shared.transition(CaptureState::RequestingAccess);

        let frames = match core.backend.start().await {
            Ok(frames) => frames,
            Err(e) => {
                error!("Microphone access failed: {}", e);
                let _ = core.teardown().await;
                core.lease = None;
                self.shared.transition(CaptureState::Failed(FailureKind::from(&e)));
                return Err(e.into());
            }
        };

        let config = &self.shared.config;
        let analyser = AnalyserNode::new(config.fft_size);

        core.recorder = Some(ClipRecorder::with_analyser(
            frames,
            analyser.clone(),
            config.sample_rate,
            config.channels,
        ));
        core.sampling = Some(SamplingLoop::start(
            FrequencySampler::new(analyser.clone()),
            config.frame_interval,
            self.shared.snapshots.clone(),
        ));
        core.analyser = Some(analyser);

        self.shared.publish_countdown(config.duration_secs);
        core.countdown = Some(self.start_countdown(core.generation));

        info!(
            "Session {} listening for {}s",
            self.shared.id, config.duration_secs
        );
        self.shared.transition(CaptureState::Listening);

        Ok(())
    }

    /// Stop listening, release the microphone and submit the clip
    ///
    /// Resolves once the session settled (or was cancelled while
    /// submitting) and returns the resulting state.
    pub async fn stop(&self) -> Result<CaptureState, SessionError> {
        self.finish(None).await
    }

    /// Stop on behalf of the countdown of `generation`
    ///
    /// The check and the stop share one lock, so a countdown from a cancelled
    /// run can never stop a session started after it.
    async fn finish(&self, expected: Option<u64>) -> Result<CaptureState, SessionError> {
        let (clip, generation, submission) = {
            let mut core = self.shared.core.lock().await;

            let state = self.state();
            if expected.is_some_and(|generation| generation != core.generation) {
                debug!("Ignoring countdown from an earlier run");
                return Err(SessionError::NotListening(state));
            }
            if state != CaptureState::Listening {
                debug!("Ignoring stop in state {}", state);
                return Err(SessionError::NotListening(state));
            }

            self.shared.transition(CaptureState::Finalizing);

            let clip = match core.teardown().await {
                Ok(clip) if !clip.is_empty() => clip,
                Ok(_) => {
                    warn!("Session {} captured no audio", self.shared.id);
                    core.lease = None;
                    self.shared.clear_snapshot();
                    self.shared.transition(CaptureState::Failed(FailureKind::Capture));
                    return Ok(self.state());
                }
                Err(e) => {
                    error!("Failed to finalize recording: {:#}", e);
                    core.lease = None;
                    self.shared.clear_snapshot();
                    self.shared.transition(CaptureState::Failed(FailureKind::Capture));
                    return Ok(self.state());
                }
            };
            self.shared.clear_snapshot();

            self.shared.emit(SessionEvent::ClipReady {
                bytes: clip.bytes.len(),
            });

            let submission = CancellationToken::new();
            core.submission = Some(submission.clone());
            self.shared.transition(CaptureState::Submitting);

            (clip, core.generation, submission)
        };

        self.submit(clip, generation, submission).await;
        Ok(self.state())
    }

    /// Abort the session
    ///
    /// From `Listening` the capture is torn down without submitting; from
    /// `Submitting` the pending result is discarded. Both return to `Idle`.
    /// Anywhere else this does nothing.
    pub async fn cancel(&self) {
        let mut core = self.shared.core.lock().await;

        match self.state() {
            CaptureState::Listening => {
                if let Err(e) = core.teardown().await {
                    debug!("Discarded recording on cancel: {:#}", e);
                }
            }
            CaptureState::Submitting => {
                if let Some(submission) = core.submission.take() {
                    submission.cancel();
                }
            }
            state => {
                debug!("Ignoring cancel in state {}", state);
                return;
            }
        }

        core.generation += 1;
        core.lease = None;
        self.shared.reset_transients();

        info!("Session {} cancelled", self.shared.id);
        self.shared.emit(SessionEvent::Cancelled);
        self.shared.transition(CaptureState::Idle);
    }

    /// Dismiss a failure and return to `Idle`
    ///
    /// Returns false (and does nothing) unless the session is `Failed`.
    pub async fn acknowledge(&self) -> bool {
        let _core = self.shared.core.lock().await;

        if self.state().failure().is_none() {
            return false;
        }

        self.shared.reset_transients();
        self.shared.transition(CaptureState::Idle);
        true
    }

    async fn submit(&self, clip: Clip, generation: u64, submission: CancellationToken) {
        info!(
            "Session {} submitting {:.1}s clip",
            self.shared.id,
            clip.duration().as_secs_f64()
        );

        let outcome = tokio::select! {
            biased;
            _ = submission.cancelled() => {
                debug!("Submission cancelled");
                return;
            }
            outcome = self.shared.recognizer.submit(clip) => outcome,
        };

        let mut core = self.shared.core.lock().await;

        if core.generation != generation
            || submission.is_cancelled()
            || self.state() != CaptureState::Submitting
        {
            debug!("Discarding stale recognition result");
            return;
        }

        core.submission = None;
        core.lease = None;

        match outcome {
            Ok(matched) => {
                let matched = Arc::new(matched);
                self.shared.history.append(Arc::clone(&matched)).await;
                core.last_match = Some(Arc::clone(&matched));
                self.shared.emit(SessionEvent::Matched(matched));
                self.shared.transition(CaptureState::Found);
            }
            Err(e) => {
                warn!(kind = e.kind(), "Recognition failed: {}", e);
                self.shared
                    .transition(CaptureState::Failed(FailureKind::from(&e)));
            }
        }
    }

    /// One tick per second; reaches 0 exactly once, then stops the session
    fn start_countdown(&self, generation: u64) -> TimerHandle {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let mut remaining = self.shared.config.duration_secs;

        Clock::repeat(COUNTDOWN_TICK, move || {
            let Some(shared) = shared.upgrade() else {
                return ControlFlow::Break(());
            };

            remaining = remaining.saturating_sub(1);
            shared.publish_countdown(remaining);

            if remaining > 0 {
                return ControlFlow::Continue(());
            }

            let session = CaptureSession { shared };
            tokio::spawn(async move {
                debug!("Countdown elapsed, stopping session {}", session.shared.id);
                if let Err(e) = session.finish(Some(generation)).await {
                    debug!("Automatic stop skipped: {}", e);
                }
            });

            ControlFlow::Break(())
        })
    }
}

impl Shared {
    fn transition(&self, next: CaptureState) {
        let previous = self.state.send_replace(next);
        info!("Session {}: {} -> {}", self.id, previous, next);
        self.emit(SessionEvent::StateChanged(next));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish_countdown(&self, remaining: u32) {
        self.countdown.send_replace(remaining);
        self.emit(SessionEvent::Countdown(remaining));
    }

    fn clear_snapshot(&self) {
        let bins = self.snapshots.borrow().len();
        self.snapshots.send_replace(FrequencySnapshot::silent(bins));
    }

    /// Restore the countdown and clear the visualizer
    fn reset_transients(&self) {
        self.countdown.send_replace(self.config.duration_secs);
        self.clear_snapshot();
    }
}

impl Core {
    /// Release every capture resource, in order, and return the clip
    ///
    /// Each step runs regardless of the ones before it. Only a failure to
    /// produce the clip is returned; release failures are logged.
    async fn teardown(&mut self) -> Result<Clip> {
        let clip = match self.recorder.take() {
            Some(mut recorder) => recorder.stop().await,
            None => Err(anyhow!("recorder was never started")),
        };

        if let Err(e) = self.backend.stop().await {
            warn!("Failed to stop microphone: {:#}", e);
        }

        if let Some(analyser) = self.analyser.take() {
            if let Err(e) = analyser.close() {
                warn!("Failed to close analyser: {:#}", e);
            }
        }

        if let Some(sampling) = self.sampling.take() {
            sampling.cancel();
        }

        if let Some(countdown) = self.countdown.take() {
            countdown.cancel();
        }

        clip
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        if let Some(submission) = self.submission.take() {
            submission.cancel();
        }
    }
}
