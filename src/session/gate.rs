use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide microphone ownership
///
/// Every capture session that may run concurrently must share one gate
/// (clone it). At most one lease exists at a time; a second `try_acquire`
/// fails until the first lease is dropped.
#[derive(Debug, Clone, Default)]
pub struct MicrophoneGate {
    busy: Arc<AtomicBool>,
}

impl MicrophoneGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<MicrophoneLease> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| MicrophoneLease {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Exclusive right to the microphone; released on drop
#[derive(Debug)]
pub struct MicrophoneLease {
    busy: Arc<AtomicBool>,
}

impl Drop for MicrophoneLease {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let gate = MicrophoneGate::new();
        let other = gate.clone();

        let lease = gate.try_acquire().unwrap();
        assert!(other.is_busy());
        assert!(other.try_acquire().is_none());

        drop(lease);
        assert!(!gate.is_busy());
        assert!(other.try_acquire().is_some());
    }
}
