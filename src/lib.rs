pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod palette;
pub mod presenter;
pub mod recognition;
pub mod session;
pub mod track;
pub mod visualizer;

pub use audio::{
    AnalyserNode, AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, Clip,
    ClipRecorder, FrequencySampler, FrequencySnapshot,
};
pub use clock::{Clock, TimerHandle};
pub use config::Config;
pub use error::{AccessError, FailureKind, RecognitionError, SessionError};
pub use history::SessionHistory;
pub use palette::{Palette, PaletteExtractor};
pub use presenter::{ResultDisplay, ResultPresenter, ResultView, TextTone};
pub use recognition::{Readiness, RecognitionClient, Recognizer};
pub use session::{CaptureSession, CaptureState, MicrophoneGate, SessionConfig, SessionEvent};
pub use track::Match;
pub use visualizer::{Bar, VisualizerConfig};
