//! Capture session management
//!
//! This module provides the `CaptureSession` state machine that manages:
//! - Microphone acquisition and release
//! - The countdown and automatic stop
//! - Recording and the visualizer sampling loop
//! - Submission to the recognition service

mod config;
mod gate;
mod session;
mod state;

pub use config::SessionConfig;
pub use gate::{MicrophoneGate, MicrophoneLease};
pub use session::CaptureSession;
pub use state::{CaptureState, SessionEvent};
