use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recognized track
///
/// Built once from a validated recognition response and shared behind an
/// `Arc` afterwards; nothing mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Artwork URL
    pub cover: Option<String>,
    /// Short audio preview URL
    pub preview: Option<String>,
    /// Release date as reported by the service
    pub release: Option<String>,
    /// Link to the track on the external catalogue
    pub spotify_url: Option<String>,
    /// Nominally 0-100, passed through unchecked
    pub popularity: Option<i64>,
    /// Nominally 0.0-1.0, passed through unchecked
    pub confidence: Option<f64>,
    /// Number of aligned fingerprint hashes behind the match
    pub align: Option<u64>,
    pub identified_at: DateTime<Utc>,
}

impl Match {
    /// Confidence as a rounded percentage
    pub fn confidence_percent(&self) -> Option<i64> {
        self.confidence.map(|c| (c * 100.0).round() as i64)
    }

    /// Display-only "when identified" label relative to `now`
    pub fn when_label(&self, now: DateTime<Utc>) -> String {
        let elapsed = now.signed_duration_since(self.identified_at);

        if elapsed.num_minutes() < 1 {
            "just now".to_string()
        } else if elapsed.num_hours() < 1 {
            format!("{} min ago", elapsed.num_minutes())
        } else if elapsed.num_days() < 1 {
            format!("{} h ago", elapsed.num_hours())
        } else {
            format!("{} d ago", elapsed.num_days())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(identified_at: DateTime<Utc>) -> Match {
        Match {
            id: Uuid::new_v4(),
            title: "Do I Wanna Know?".to_string(),
            artist: "Arctic Monkeys".to_string(),
            album: None,
            cover: None,
            preview: None,
            release: None,
            spotify_url: None,
            popularity: None,
            confidence: Some(0.94),
            align: None,
            identified_at,
        }
    }

    #[test]
    fn test_when_label() {
        let at = Utc::now();
        let m = sample(at);

        assert_eq!(m.when_label(at + Duration::seconds(30)), "just now");
        assert_eq!(m.when_label(at + Duration::minutes(5)), "5 min ago");
        assert_eq!(m.when_label(at + Duration::hours(3)), "3 h ago");
        assert_eq!(m.when_label(at + Duration::days(2)), "2 d ago");
    }

    #[test]
    fn test_confidence_percent_rounds() {
        assert_eq!(sample(Utc::now()).confidence_percent(), Some(94));
    }
}
