use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RecognitionError;
use crate::track::Match;

/// Body of a `POST /recognize` response
///
/// Only trusted after `success` was checked to be literally `true`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub success: bool,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub cover: Option<String>,
    pub preview: Option<String>,
    pub release: Option<String>,
    pub spotify_url: Option<String>,
    pub popularity: Option<i64>,
    pub confidence: Option<f64>,
    pub align: Option<u64>,
    pub message: Option<String>,
}

impl RecognizeResponse {
    /// Validate a raw response body into a `Match`
    pub fn parse(body: &[u8], identified_at: DateTime<Utc>) -> Result<Match, RecognitionError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| RecognitionError::MalformedResponse(format!("not JSON: {e}")))?;

        let Value::Object(ref fields) = value else {
            return Err(RecognitionError::MalformedResponse(
                "response is not a JSON object".to_string(),
            ));
        };

        if fields.get("success") != Some(&Value::Bool(true)) {
            let message = fields
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no_match")
                .to_string();
            return Err(RecognitionError::NoMatch(message));
        }

        let response: RecognizeResponse = serde_json::from_value(value)
            .map_err(|e| RecognitionError::MalformedResponse(e.to_string()))?;

        response.into_match(identified_at)
    }

    fn into_match(self, identified_at: DateTime<Utc>) -> Result<Match, RecognitionError> {
        let title = required(self.title, "title")?;
        let artist = required(self.artist, "artist")?;

        Ok(Match {
            id: Uuid::new_v4(),
            title,
            artist,
            album: self.album,
            cover: self.cover,
            preview: self.preview,
            release: self.release,
            spotify_url: self.spotify_url,
            popularity: self.popularity,
            confidence: self.confidence,
            align: self.align,
            identified_at,
        })
    }
}

fn required(field: Option<String>, name: &str) -> Result<String, RecognitionError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(RecognitionError::MalformedResponse(format!(
            "missing `{name}`"
        ))),
    }
}

/// Body of a `GET /ping` response
#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
    pub message: Option<String>,
    pub songs_loaded: Option<u64>,
    pub hash_buckets: Option<u64>,
    pub device: Option<String>,
    pub timestamp: Option<String>,
}

/// Readiness of the recognition service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Readiness {
    Booting {
        message: Option<String>,
    },
    /// The index is loaded; the counts are informational only
    Ready {
        songs_loaded: Option<u64>,
        hash_buckets: Option<u64>,
        device: Option<String>,
    },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

impl From<PingResponse> for Readiness {
    fn from(ping: PingResponse) -> Self {
        if ping.status == "ready" {
            Self::Ready {
                songs_loaded: ping.songs_loaded,
                hash_buckets: ping.hash_buckets,
                device: ping.device,
            }
        } else {
            Self::Booting {
                message: ping.message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<Match, RecognitionError> {
        RecognizeResponse::parse(body.as_bytes(), Utc::now())
    }

    #[test]
    fn test_well_formed_response_becomes_match() {
        let m = parse(
            r#"{"success":true,"title":"A","artist":"B","popularity":84,"confidence":0.93}"#,
        )
        .unwrap();

        assert_eq!(m.title, "A");
        assert_eq!(m.artist, "B");
        assert_eq!(m.popularity, Some(84));
        assert_eq!(m.confidence, Some(0.93));
        assert_eq!(m.album, None);
        assert_eq!(m.preview, None);
    }

    #[test]
    fn test_full_response_keeps_optional_fields() {
        let m = parse(
            r#"{
                "success": true,
                "artist": "Arctic Monkeys",
                "title": "Do I Wanna Know?",
                "album": "AM",
                "cover": "https://img.example/am.jpg",
                "preview": "https://audio.example/p.mp3",
                "release": "2013-09-09",
                "spotify_url": "https://open.spotify.com/track/x",
                "popularity": 88,
                "align": 41,
                "confidence": 0.62
            }"#,
        )
        .unwrap();

        assert_eq!(m.album.as_deref(), Some("AM"));
        assert_eq!(m.release.as_deref(), Some("2013-09-09"));
        assert_eq!(m.align, Some(41));
    }

    #[test]
    fn test_success_without_title_or_artist_is_malformed() {
        assert!(matches!(
            parse(r#"{"success":true}"#),
            Err(RecognitionError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse(r#"{"success":true,"title":"A","artist":"  "}"#),
            Err(RecognitionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_out_of_range_values_pass_through() {
        let m = parse(r#"{"success":true,"title":"A","artist":"B","popularity":140,"confidence":1.7}"#)
            .unwrap();
        assert_eq!(m.popularity, Some(140));
        assert_eq!(m.confidence, Some(1.7));
    }

    #[test]
    fn test_failure_shapes_are_no_match() {
        match parse(r#"{"success":false,"message":"no_match"}"#) {
            Err(RecognitionError::NoMatch(message)) => assert_eq!(message, "no_match"),
            other => panic!("unexpected: {other:?}"),
        }

        // `success` must be the boolean true, not merely truthy
        assert!(matches!(
            parse(r#"{"success":"true","title":"A","artist":"B"}"#),
            Err(RecognitionError::NoMatch(_))
        ));
        assert!(matches!(
            parse(r#"{"title":"A","artist":"B"}"#),
            Err(RecognitionError::NoMatch(_))
        ));
    }

    #[test]
    fn test_non_object_bodies_are_malformed() {
        assert!(matches!(
            parse("<html>502</html>"),
            Err(RecognitionError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse("[1,2]"),
            Err(RecognitionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_ping_readiness() {
        let ready: PingResponse = serde_json::from_str(
            r#"{"status":"ready","songs_loaded":1200,"hash_buckets":90000,"device":"cuda","timestamp":"2025-01-01T00:00:00"}"#,
        )
        .unwrap();
        let booting: PingResponse =
            serde_json::from_str(r#"{"status":"booting","message":"Loading fingerprints into memory..."}"#)
                .unwrap();

        assert!(Readiness::from(ready).is_ready());
        assert_eq!(
            Readiness::from(booting),
            Readiness::Booting {
                message: Some("Loading fingerprints into memory...".to_string())
            }
        );
    }
}
