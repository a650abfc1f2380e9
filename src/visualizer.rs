use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::audio::FrequencySnapshot;

/// Geometry of the circular bar ring
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub bars: usize,
    pub base_radius: f32,
    pub radius_spread: f32,
    pub min_height: f32,
    pub height_spread: f32,
    pub min_opacity: f32,
    pub opacity_spread: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            bars: 28,
            base_radius: 120.0,
            radius_spread: 30.0,
            min_height: 6.0,
            height_spread: 18.0,
            min_opacity: 0.4,
            opacity_spread: 0.6,
        }
    }
}

/// One bar of the ring
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bar {
    /// Radians, clockwise from the positive x axis
    pub angle: f32,
    /// Distance of the bar from the ring centre
    pub radius: f32,
    pub height: f32,
    pub opacity: f32,
}

impl Bar {
    /// Offset of the bar from the ring centre
    pub fn position(&self) -> (f32, f32) {
        (self.angle.cos() * self.radius, self.angle.sin() * self.radius)
    }
}

/// Map the first `config.bars` bins of a snapshot onto the ring
///
/// Bins missing from a short snapshot are drawn at rest.
pub fn ring(snapshot: &FrequencySnapshot, config: &VisualizerConfig) -> Vec<Bar> {
    let n = config.bars;

    (0..n)
        .map(|i| {
            let level = snapshot.magnitude(i) as f32 / 255.0;
            Bar {
                angle: i as f32 / n as f32 * TAU,
                radius: config.base_radius + level * config.radius_spread,
                height: config.min_height + level * config.height_spread,
                opacity: config.min_opacity + level * config.opacity_spread,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_snapshot_rests_every_bar() {
        let config = VisualizerConfig::default();
        let bars = ring(&FrequencySnapshot::silent(64), &config);

        assert_eq!(bars.len(), 28);
        for bar in &bars {
            assert_eq!(bar.radius, config.base_radius);
            assert_eq!(bar.height, config.min_height);
            assert_eq!(bar.opacity, config.min_opacity);
        }
    }

    #[test]
    fn test_full_scale_snapshot_hits_upper_bounds() {
        let config = VisualizerConfig::default();
        let bars = ring(&FrequencySnapshot::new(vec![255; 64]), &config);

        for bar in &bars {
            assert_eq!(bar.radius, config.base_radius + config.radius_spread);
            assert_eq!(bar.height, config.min_height + config.height_spread);
            assert_eq!(bar.opacity, config.min_opacity + config.opacity_spread);
        }
    }

    #[test]
    fn test_angles_are_evenly_spaced() {
        let config = VisualizerConfig {
            bars: 4,
            ..VisualizerConfig::default()
        };
        let bars = ring(&FrequencySnapshot::default(), &config);

        let angles: Vec<f32> = bars.iter().map(|b| b.angle).collect();
        assert_eq!(angles, vec![0.0, TAU / 4.0, TAU / 2.0, TAU * 3.0 / 4.0]);
    }

    #[test]
    fn test_ring_is_deterministic() {
        let config = VisualizerConfig::default();
        let snapshot = FrequencySnapshot::new((0..64).map(|i| (i * 4) as u8).collect());

        assert_eq!(ring(&snapshot, &config), ring(&snapshot, &config));
        assert_eq!(ring(&snapshot, &config)[10].height, 6.0 + 40.0 / 255.0 * 18.0);
    }
}
