use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::FailureKind;
use crate::track::Match;

/// Where a capture session is in its lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// Nothing held, ready to start
    #[default]
    Idle,

    /// Waiting for the microphone permission / stream
    RequestingAccess,

    /// Microphone live, countdown running
    Listening,

    /// Tearing down capture and encoding the clip
    Finalizing,

    /// Clip sent, waiting for the recognition service
    Submitting,

    /// A match was identified; terminal for this session
    Found,

    /// Capture or recognition failed; `acknowledge` returns to `Idle`
    Failed(FailureKind),
}

impl CaptureState {
    /// True while the session holds (or is acquiring) the microphone lease
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::RequestingAccess | Self::Listening | Self::Finalizing | Self::Submitting
        )
    }

    /// True once the session reached `Found` or `Failed`
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Found | Self::Failed(_))
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            Self::Failed(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::RequestingAccess => write!(f, "requesting_access"),
            Self::Listening => write!(f, "listening"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Submitting => write!(f, "submitting"),
            Self::Found => write!(f, "found"),
            Self::Failed(kind) => write!(f, "failed ({})", kind.message()),
        }
    }
}

/// Notifications published by a capture session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(CaptureState),

    /// Seconds left before the automatic stop
    Countdown(u32),

    /// The recording was finalized into a clip of `bytes` bytes
    ClipReady { bytes: usize },

    Matched(Arc<Match>),

    /// The session was aborted by `cancel`
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_and_settled_are_disjoint() {
        let states = [
            CaptureState::Idle,
            CaptureState::RequestingAccess,
            CaptureState::Listening,
            CaptureState::Finalizing,
            CaptureState::Submitting,
            CaptureState::Found,
            CaptureState::Failed(FailureKind::NoMatchOrOffline),
        ];

        for state in states {
            assert!(!(state.is_active() && state.is_settled()), "{state}");
        }
        assert!(!CaptureState::Idle.is_active());
        assert!(!CaptureState::Idle.is_settled());
    }

    #[test]
    fn test_failed_display_carries_message() {
        let state = CaptureState::Failed(FailureKind::PermissionDenied);
        assert_eq!(state.to_string(), "failed (Mic access denied)");
        assert_eq!(state.failure(), Some(FailureKind::PermissionDenied));
    }
}
