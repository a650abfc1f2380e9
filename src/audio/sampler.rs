// Frame-paced reads of the analyser node
//
// The sampler keeps no history: each pull reads the node's current
// magnitudes, and the loop publishes into a watch channel so observers only
// ever see the latest snapshot.

use futures::stream::{self, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::analyser::AnalyserNode;

/// One instantaneous reading of frequency-bin magnitudes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencySnapshot {
    bins: Vec<u8>,
}

impl FrequencySnapshot {
    pub fn new(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    /// `len` bins at magnitude 0
    pub fn silent(len: usize) -> Self {
        Self { bins: vec![0; len] }
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    /// Magnitude of bin `index`; bins past the end read as 0
    pub fn magnitude(&self, index: usize) -> u8 {
        self.bins.get(index).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Produces snapshots from a live analyser node
#[derive(Clone)]
pub struct FrequencySampler {
    analyser: AnalyserNode,
}

impl FrequencySampler {
    pub fn new(analyser: AnalyserNode) -> Self {
        Self { analyser }
    }

    /// Read the current magnitudes
    pub fn sample(&self) -> FrequencySnapshot {
        FrequencySnapshot::new(self.analyser.byte_frequency_data())
    }

    /// Endless stream of snapshots, one per `frame_interval`
    ///
    /// The stream ends at the first frame boundary after `cancel` fires and
    /// never yields once cancellation was observed. Calling this again
    /// starts a fresh stream over the same node.
    pub fn frames(
        &self,
        frame_interval: Duration,
        cancel: CancellationToken,
    ) -> impl Stream<Item = FrequencySnapshot> + Send + 'static {
        let mut interval = time::interval(frame_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        stream::unfold(
            (self.clone(), interval, cancel),
            |(sampler, mut interval, cancel)| async move {
                if cancel.is_cancelled() {
                    return None;
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    _ = interval.tick() => {
                        let snapshot = sampler.sample();
                        Some((snapshot, (sampler, interval, cancel)))
                    }
                }
            },
        )
    }
}

/// The running per-frame sampling task
pub struct SamplingLoop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SamplingLoop {
    /// Publish a snapshot into `latest` every frame until cancelled
    pub fn start(
        sampler: FrequencySampler,
        frame_interval: Duration,
        latest: watch::Sender<FrequencySnapshot>,
    ) -> Self {
        let token = CancellationToken::new();
        let frames = sampler.frames(frame_interval, token.clone());

        let task = tokio::spawn(async move {
            let mut frames = Box::pin(frames);
            while let Some(snapshot) = frames.next().await {
                latest.send_replace(snapshot);
            }
            debug!("Sampling loop stopped");
        });

        Self { token, task }
    }

    /// Request the loop to stop; takes effect within one frame
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SamplingLoop {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
