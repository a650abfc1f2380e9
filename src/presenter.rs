// Result screen model
//
// `ResultPresenter` is a pure function of a match and a palette.
// `ResultView` is the stateful screen around it: it owns the palette
// extraction for its match and the preview play/pause toggle.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::palette::{Palette, PaletteExtractor, Rgba};
use crate::track::Match;

/// Luminance above which text switches to dark-on-light
pub const TEXT_CONTRAST_THRESHOLD: f64 = 160.0;

/// Colour the background gradient fades into
pub const BACKDROP: Rgba = Rgba {
    r: 10,
    g: 13,
    b: 19,
    a: 1.0,
};

const EXTERNAL_LINK_BRIGHTEN: f64 = 1.3;

/// Text colour choice for a coloured background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextTone {
    /// Dark text on a light background
    Dark,
    /// Light text on a dark background
    Light,
}

impl TextTone {
    /// Exactly 160 still counts as dark background
    pub fn for_background(palette: Palette) -> Self {
        if palette.luminance() > TEXT_CONTRAST_THRESHOLD {
            Self::Dark
        } else {
            Self::Light
        }
    }

    pub fn css(&self) -> &'static str {
        match self {
            Self::Dark => "#111",
            Self::Light => "#f1f1f1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradientStop {
    pub color: Rgba,
    /// Position along the gradient, 0.0-1.0
    pub offset: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearGradient {
    pub angle_deg: u16,
    pub stops: Vec<GradientStop>,
}

impl LinearGradient {
    pub fn to_css(&self) -> String {
        let stops: Vec<String> = self
            .stops
            .iter()
            .map(|stop| format!("{} {}%", stop.color, (stop.offset * 100.0).round()))
            .collect();
        format!("linear-gradient({}deg, {})", self.angle_deg, stops.join(", "))
    }
}

/// Background styling derived from the palette
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Theme {
    pub background: LinearGradient,
    pub glow: Rgba,
    pub accent: Palette,
}

impl Theme {
    pub fn from_palette(palette: Palette) -> Self {
        Self {
            background: LinearGradient {
                angle_deg: 180,
                stops: vec![
                    GradientStop {
                        color: palette.with_alpha(0.4),
                        offset: 0.0,
                    },
                    GradientStop {
                        color: BACKDROP,
                        offset: 0.9,
                    },
                ],
            },
            glow: palette.with_alpha(0.5),
            accent: palette,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityBar {
    /// Value as reported, possibly out of range
    pub value: i64,
    /// Bar width in percent, always within 0-100
    pub fill_percent: f64,
}

impl PopularityBar {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            fill_percent: value.clamp(0, 100) as f64,
        }
    }

    pub fn label(&self) -> String {
        format!("{}/100", self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewControl {
    pub url: String,
    pub playing: bool,
}

impl PreviewControl {
    pub fn label(&self) -> &'static str {
        if self.playing {
            "Pause Preview"
        } else {
            "Hear Preview"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalLink {
    pub url: String,
    pub background: Palette,
    pub text: TextTone,
}

/// Everything the result screen renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultDisplay {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub release: Option<String>,
    pub cover: Option<String>,
    pub confidence_percent: Option<i64>,
    pub theme: Theme,
    pub text: TextTone,
    /// Absent when the match carries no popularity
    pub popularity: Option<PopularityBar>,
    /// Absent when the match has no preview; the control must not render
    pub preview: Option<PreviewControl>,
    pub link: Option<ExternalLink>,
}

pub struct ResultPresenter;

impl ResultPresenter {
    pub fn present(matched: &Match, palette: Palette, preview_playing: bool) -> ResultDisplay {
        let text = TextTone::for_background(palette);

        ResultDisplay {
            id: matched.id,
            title: matched.title.clone(),
            artist: matched.artist.clone(),
            album: matched.album.clone(),
            release: matched.release.clone(),
            cover: matched.cover.clone(),
            confidence_percent: matched.confidence_percent(),
            theme: Theme::from_palette(palette),
            text,
            popularity: matched.popularity.map(PopularityBar::new),
            preview: matched.preview.as_ref().map(|url| PreviewControl {
                url: url.clone(),
                playing: preview_playing,
            }),
            link: matched.spotify_url.as_ref().map(|url| ExternalLink {
                url: url.clone(),
                background: palette.brighten(EXTERNAL_LINK_BRIGHTEN),
                text,
            }),
        }
    }
}

struct Extraction {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// The open result screen for one match
///
/// Starts at the fallback palette and swaps in the artwork colour at most
/// once. Closing (dropping) the view discards an extraction still in flight.
pub struct ResultView {
    matched: Arc<Match>,
    palette: watch::Receiver<Palette>,
    extraction: Option<Extraction>,
    preview_playing: bool,
}

impl ResultView {
    pub fn open(matched: Arc<Match>, extractor: &PaletteExtractor) -> Self {
        let (palette_tx, palette) = watch::channel(extractor.fallback());

        let extraction = matched.cover.clone().map(|url| {
            let token = CancellationToken::new();
            let cancelled = token.clone();
            let extractor = extractor.clone();

            let task = tokio::spawn(async move {
                let palette = tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => return,
                    palette = extractor.extract(&url) => palette,
                };

                if cancelled.is_cancelled() {
                    debug!("Discarding palette for closed result view");
                    return;
                }

                palette_tx.send_replace(palette);
            });

            Extraction { token, task }
        });

        Self {
            matched,
            palette,
            extraction,
            preview_playing: false,
        }
    }

    pub fn matched(&self) -> &Arc<Match> {
        &self.matched
    }

    pub fn palette(&self) -> Palette {
        *self.palette.borrow()
    }

    pub fn display(&self) -> ResultDisplay {
        ResultPresenter::present(&self.matched, self.palette(), self.preview_playing)
    }

    /// Flip preview playback; `None` when the match has no preview
    pub fn toggle_preview(&mut self) -> Option<bool> {
        self.matched.preview.as_ref()?;
        self.preview_playing = !self.preview_playing;
        Some(self.preview_playing)
    }

    /// The preview played to its end
    pub fn preview_ended(&mut self) {
        self.preview_playing = false;
    }

    /// Wait for the artwork extraction (if any) and return the final palette
    pub async fn palette_settled(&mut self) -> Palette {
        if let Some(extraction) = self.extraction.take() {
            let _ = extraction.task.await;
        }
        self.palette()
    }

    /// Leave the result screen
    pub fn close(self) {}
}

impl Drop for ResultView {
    fn drop(&mut self) {
        if let Some(extraction) = &self.extraction {
            extraction.token.cancel();
        }
    }
}
