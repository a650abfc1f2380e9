use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::messages::{PingResponse, Readiness, RecognizeResponse};
use super::Recognizer;
use crate::audio::Clip;
use crate::config::ServiceConfig;
use crate::error::RecognitionError;
use crate::track::Match;

/// Multipart field carrying the clip
const AUDIO_FIELD: &str = "audio";

/// HTTP client for the recognition service
///
/// One request per call, no retries. Every request is bounded by the
/// configured timeout.
#[derive(Clone)]
pub struct RecognitionClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl RecognitionClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        info!("Recognition service at {}", config.base_url);

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            poll_interval: Duration::from_secs(config.ready_poll_secs.max(1)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one clip to `POST /recognize`
    pub async fn recognize(&self, clip: Clip) -> Result<Match, RecognitionError> {
        let url = format!("{}/recognize", self.base_url);
        let size = clip.bytes.len();

        let part = Part::bytes(clip.bytes)
            .file_name(clip.file_name)
            .mime_str(&clip.mime)
            .map_err(|e| self.transport_error(e))?;
        let form = Form::new().part(AUDIO_FIELD, part);

        info!("Submitting {} byte clip to {}", size, url);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecognitionError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        let matched = RecognizeResponse::parse(&body, Utc::now())?;

        info!(
            "Recognized \"{}\" by {} (confidence={:?})",
            matched.title, matched.artist, matched.confidence
        );

        Ok(matched)
    }

    /// Ask `GET /ping` whether the service index is loaded
    pub async fn ping(&self) -> Result<Readiness, RecognitionError> {
        let url = format!("{}/ping", self.base_url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecognitionError::Status(status.as_u16()));
        }

        let ping: PingResponse = response
            .json()
            .await
            .map_err(|e| RecognitionError::MalformedResponse(e.to_string()))?;

        Ok(ping.into())
    }

    /// Poll `/ping` until the service reports ready
    ///
    /// Transport errors and "booting" answers both mean "ask again later".
    /// Returns `None` if `cancel` fires first.
    pub async fn wait_until_ready(&self, cancel: &CancellationToken) -> Option<Readiness> {
        loop {
            match self.ping().await {
                Ok(readiness) if readiness.is_ready() => {
                    info!("Recognition service ready: {:?}", readiness);
                    return Some(readiness);
                }
                Ok(readiness) => debug!("Recognition service not ready: {:?}", readiness),
                Err(e) => debug!("Recognition service unreachable: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Stopped waiting for recognition service");
                    return None;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> RecognitionError {
        if err.is_timeout() {
            RecognitionError::Timeout(self.timeout)
        } else {
            RecognitionError::Network(err)
        }
    }
}

#[async_trait::async_trait]
impl Recognizer for RecognitionClient {
    async fn submit(&self, clip: Clip) -> Result<Match, RecognitionError> {
        self.recognize(clip).await
    }
}
