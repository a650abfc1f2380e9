//! Error taxonomy shared by the capture, recognition and session layers.
//!
//! Only failures that block the primary task are typed here. Teardown and
//! palette failures are absorbed where they happen and never reach callers.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::session::CaptureState;

/// Failure to acquire the microphone
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("no input device available")]
    NoDevice,

    #[error("audio backend error: {0}")]
    Backend(String),
}

/// Failure of a single recognition request
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("recognition service returned HTTP {0}")]
    Status(u16),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("no match ({0})")]
    NoMatch(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl RecognitionError {
    /// Short tag for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::Status(_) | Self::Timeout(_) => "network",
            Self::NoMatch(_) => "no_match",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Rejections of session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("another capture session is already active")]
    Busy,

    #[error("session already started (state: {0})")]
    AlreadyStarted(CaptureState),

    #[error("session is not listening (state: {0})")]
    NotListening(CaptureState),

    #[error(transparent)]
    Access(#[from] AccessError),
}

/// User-visible reason carried by a failed session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PermissionDenied,
    MicrophoneUnavailable,
    NoMatchOrOffline,
    Capture,
}

impl FailureKind {
    pub fn message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Mic access denied",
            Self::MicrophoneUnavailable => "No microphone found",
            Self::NoMatchOrOffline => "No match or server offline",
            Self::Capture => "Recording failed",
        }
    }
}

impl From<&AccessError> for FailureKind {
    fn from(err: &AccessError) -> Self {
        match err {
            AccessError::PermissionDenied(_) => Self::PermissionDenied,
            AccessError::NoDevice | AccessError::Backend(_) => Self::MicrophoneUnavailable,
        }
    }
}

impl From<&RecognitionError> for FailureKind {
    fn from(_: &RecognitionError) -> Self {
        Self::NoMatchOrOffline
    }
}
