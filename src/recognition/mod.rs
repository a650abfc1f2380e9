//! Client side of the recognition service
//!
//! - `POST /recognize` - submit a recorded clip, get a `Match` back
//! - `GET /ping` - readiness of the service's fingerprint index

mod client;
mod messages;

pub use client::RecognitionClient;
pub use messages::{PingResponse, Readiness, RecognizeResponse};

use crate::audio::Clip;
use crate::error::RecognitionError;
use crate::track::Match;

/// Anything that can turn a clip into a match
///
/// The session only talks to this trait, so tests can substitute the
/// network service.
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    async fn submit(&self, clip: Clip) -> Result<Match, RecognitionError>;
}
