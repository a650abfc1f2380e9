// Dominant-colour extraction from remote artwork
//
// Best effort only: the extractor always answers with a palette, falling
// back to the configured colour on any fetch or decode problem.

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PaletteConfig;

/// Pixels skipped between samples
const SAMPLE_STRIDE: usize = 10;
/// Pixels at or under this alpha are ignored
const MIN_ALPHA: u8 = 125;
/// Near-white pixels are ignored so backgrounds do not win
const WHITE_CUTOFF: u8 = 250;
/// Bits kept per channel when bucketing colours
const QUANT_BITS: u32 = 5;

/// Dominant display colour of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Palette {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Palette {
    /// Brand green, used whenever artwork gives nothing better
    pub const BRAND: Palette = Palette::new(107, 255, 203);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Perceived brightness, 0-255
    pub fn luminance(&self) -> f64 {
        0.299 * self.r as f64 + 0.587 * self.g as f64 + 0.114 * self.b as f64
    }

    /// Scale every channel by `factor`, saturating at 255
    pub fn brighten(&self, factor: f64) -> Self {
        let scale = |c: u8| (c as f64 * factor).round().clamp(0.0, 255.0) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }

    pub fn with_alpha(&self, alpha: f32) -> Rgba {
        Rgba {
            r: self.r,
            g: self.g,
            b: self.b,
            a: alpha,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::BRAND
    }
}

impl From<[u8; 3]> for Palette {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({},{},{})", self.r, self.g, self.b)
    }
}

/// Colour with opacity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({},{},{},{})", self.r, self.g, self.b, self.a)
    }
}

/// Fetches artwork and derives its dominant colour
#[derive(Clone)]
pub struct PaletteExtractor {
    http: reqwest::Client,
    fallback: Palette,
}

impl PaletteExtractor {
    pub fn new(config: &PaletteConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs.max(1)))
            .build()
            .context("Failed to build artwork HTTP client")?;

        Ok(Self {
            http,
            fallback: config.fallback(),
        })
    }

    pub fn fallback(&self) -> Palette {
        self.fallback
    }

    /// Dominant colour of the image at `url`, or the fallback
    pub async fn extract(&self, url: &str) -> Palette {
        match self.try_extract(url).await {
            Ok(palette) => {
                debug!("Extracted {} from {}", palette, url);
                palette
            }
            Err(e) => {
                warn!("Palette extraction failed for {}: {:#}", url, e);
                self.fallback
            }
        }
    }

    async fn try_extract(&self, url: &str) -> Result<Palette> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("Failed to fetch artwork")?
            .error_for_status()
            .context("Artwork request rejected")?;
        let bytes = response.bytes().await.context("Failed to read artwork")?;

        // Decoding is CPU-bound; keep it off the async workers
        let dominant = tokio::task::spawn_blocking(move || -> Result<Option<Palette>> {
            let image = image::load_from_memory(&bytes).context("Failed to decode artwork")?;
            Ok(dominant_color(&image))
        })
        .await
        .context("Artwork decoder panicked")??;

        match dominant {
            Some(palette) => Ok(palette),
            None => bail!("artwork has no usable pixels"),
        }
    }
}

/// Average colour of the most populated quantized colour bucket
///
/// Samples every `SAMPLE_STRIDE`th pixel, skipping transparent and
/// near-white ones. `None` if no pixel qualifies.
pub fn dominant_color(image: &DynamicImage) -> Option<Palette> {
    let rgba = image.to_rgba8();
    let shift = 8 - QUANT_BITS;
    let mut buckets: Vec<[u64; 4]> = vec![[0; 4]; 1 << (3 * QUANT_BITS)];

    for pixel in rgba.pixels().step_by(SAMPLE_STRIDE) {
        let [r, g, b, a] = pixel.0;
        if a <= MIN_ALPHA || (r > WHITE_CUTOFF && g > WHITE_CUTOFF && b > WHITE_CUTOFF) {
            continue;
        }

        let key = ((r as usize >> shift) << (2 * QUANT_BITS))
            | ((g as usize >> shift) << QUANT_BITS)
            | (b as usize >> shift);
        let bucket = &mut buckets[key];
        bucket[0] += 1;
        bucket[1] += r as u64;
        bucket[2] += g as u64;
        bucket[3] += b as u64;
    }

    let [count, r, g, b] = buckets
        .into_iter()
        .filter(|bucket| bucket[0] > 0)
        .max_by(|a, b| a[0].cmp(&b[0]))?;

    Some(Palette::new(
        (r / count) as u8,
        (g / count) as u8,
        (b / count) as u8,
    ))
}
