//! Physics and lighting consistency
//!
//! Estimates a per-pixel lighting direction from brightness gradients (3x3
//! Sobel over the HSV value channel) and records how much that direction
//! varies. Complex scenes have complex lighting, so the spread alone cannot
//! separate real from generated; it is recorded for inspection and the score
//! comes from a [`FrameCheck`] that is a constant 0 for now. Eye-glint
//! symmetry needs a high-resolution eye model and is not checked.

use super::layer::{FrameCheck, ForensicLayer, LayerId, LayerInput, LayerResult, NullCheck};
use super::spectrum;
use crate::media::MediaKind;
use image::RgbImage;

pub const PLAUSIBILITY_PLACEHOLDER: NullCheck = NullCheck::new("physical_plausibility", 0.0);

/// Gradient statistics of the brightness channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingStats {
    /// Standard deviation of `atan2(gy, gx)` in radians.
    pub direction_std: f64,
    pub mean_magnitude: f64,
}

pub struct PhysicsLayer {
    plausibility: Box<dyn FrameCheck>,
}

impl Default for PhysicsLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsLayer {
    pub fn new() -> Self {
        Self {
            plausibility: Box::new(PLAUSIBILITY_PLACEHOLDER),
        }
    }

    pub fn with_plausibility_check(mut self, check: Box<dyn FrameCheck>) -> Self {
        self.plausibility = check;
        self
    }

    pub fn analyze_frame(&self, frame: &RgbImage) -> LayerResult {
        let mut result = LayerResult::neutral(self.plausibility.evaluate(frame));
        match lighting_stats(frame) {
            Some(stats) => {
                result.detail("lighting_direction_std", stats.direction_std);
                result.detail("mean_gradient_magnitude", stats.mean_magnitude);
            }
            None => {
                result = result.with_error("frame too small for gradient estimation");
            }
        }
        result.detail("eye_glint_consistency", "not checked");
        result
    }
}

/// HSV value channel: max of the three components.
fn value_channel(frame: &RgbImage) -> Vec<f64> {
    frame
        .pixels()
        .map(|p| p.0.iter().copied().max().unwrap_or(0) as f64)
        .collect()
}

/// Sobel gradients over interior pixels. `None` below 3x3.
pub fn lighting_stats(frame: &RgbImage) -> Option<LightingStats> {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    if w < 3 || h < 3 {
        return None;
    }
    let v = value_channel(frame);
    let at = |x: usize, y: usize| v[y * w + x];

    let mut directions = Vec::with_capacity((w - 2) * (h - 2));
    let mut magnitude_sum = 0.0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            directions.push(gy.atan2(gx));
            magnitude_sum += (gx * gx + gy * gy).sqrt();
        }
    }

    Some(LightingStats {
        direction_std: spectrum::std_dev(&directions),
        mean_magnitude: magnitude_sum / directions.len() as f64,
    })
}

impl ForensicLayer for PhysicsLayer {
    fn id(&self) -> LayerId {
        LayerId::Physics
    }

    fn supports(&self, kind: MediaKind) -> bool {
        kind == MediaKind::Image
    }

    fn analyze(&self, input: &LayerInput<'_>) -> LayerResult {
        let result = self.analyze_frame(input.frame);
        log::debug!("physics: score={:.3}", result.score());
        result
    }
}
