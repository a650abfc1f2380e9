pub mod analyser;
pub mod backend;
pub mod recorder;
pub mod sampler;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use analyser::AnalyserNode;
pub use backend::{
    downmix, fold_channels, AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame,
};
pub use recorder::{Clip, ClipRecorder};
pub use sampler::{FrequencySampler, FrequencySnapshot, SamplingLoop};
