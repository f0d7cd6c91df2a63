//! Early signature layer
//!
//! An independent look at the log-magnitude spectrum, aimed at the "star"
//! and grid patterns that GAN and diffusion upsamplers leave behind.
//!
//! Frames larger than 1024 on either side are resized to exactly 1024x1024
//! so the constants below mean the same thing for every input. The low
//! frequencies (a disk of 15% of the shorter side) are masked out, and in
//! what remains we measure:
//!
//! - mean log-magnitude, `20 * ln(|F| + 1e-7)`, against a reference of 200
//! - the number of bins above mean + 3 sigma, against a reference of 100
//!
//! `score = 0.4 * min(mean / 200, 1) + 0.6 * min(peaks / 100, 1)`

use super::layer::{round3, ForensicLayer, LayerId, LayerInput, LayerResult};
use super::spectrum::{self, Spectrum};
use crate::error::{Error, Result};
use image::{imageops, RgbImage};

pub const MAX_SIDE: u32 = 1024;
const MASK_FRACTION: f64 = 0.15;
const LOG_EPS: f64 = 1e-7;
const MEAN_REFERENCE: f64 = 200.0;
const PEAK_REFERENCE: f64 = 100.0;
const PEAK_SIGMA: f64 = 3.0;
const MEAN_WEIGHT: f64 = 0.4;
const PEAK_WEIGHT: f64 = 0.6;
const ANOMALY_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignatureStats {
    pub high_freq_mean: f64,
    pub high_freq_max: f64,
    pub peaks: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EarlySignatureLayer;

impl EarlySignatureLayer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze_frame(&self, frame: &RgbImage) -> LayerResult {
        let stats = match signature_stats(frame) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("early_signature: {}", e);
                return LayerResult::neutral(0.0).with_error(e);
            }
        };

        let mut result = LayerResult::neutral(stats.score);
        result.detail("fft_high_freq_mean", stats.high_freq_mean);
        result.detail("fft_high_freq_max", stats.high_freq_max);
        result.detail("fft_peaks", stats.peaks);
        if stats.score > ANOMALY_THRESHOLD {
            result.flag("High-frequency periodic artifacts detected (grid/checkerboard)");
        }
        result
    }
}

pub fn signature_stats(frame: &RgbImage) -> Result<SignatureStats> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(Error::Container("empty frame".to_string()));
    }

    let mut gray = imageops::grayscale(frame);
    if gray.width() > MAX_SIDE || gray.height() > MAX_SIDE {
        gray = imageops::resize(&gray, MAX_SIDE, MAX_SIDE, imageops::FilterType::Triangle);
    }

    let spec = Spectrum::compute(&gray);
    let radius = (spec.width.min(spec.height) as f64 * MASK_FRACTION).floor();
    let region: Vec<f64> = spec
        .outside_disk(radius)
        .into_iter()
        .map(|m| spectrum::log_magnitude(m, LOG_EPS))
        .collect();
    if region.is_empty() {
        return Err(Error::Container("no high-frequency region".to_string()));
    }

    let mean = spectrum::mean(&region);
    let std = spectrum::std_dev(&region);
    let max = region.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let threshold = mean + PEAK_SIGMA * std;
    let peaks = region.iter().filter(|&&v| v > threshold).count();

    let mean_ratio = (mean / MEAN_REFERENCE).clamp(0.0, 1.0);
    let peak_ratio = (peaks as f64 / PEAK_REFERENCE).min(1.0);

    Ok(SignatureStats {
        high_freq_mean: mean,
        high_freq_max: max,
        peaks,
        score: round3(MEAN_WEIGHT * mean_ratio + PEAK_WEIGHT * peak_ratio),
    })
}

impl ForensicLayer for EarlySignatureLayer {
    fn id(&self) -> LayerId {
        LayerId::EarlySignature
    }

    fn analyze(&self, input: &LayerInput<'_>) -> LayerResult {
        let result = self.analyze_frame(input.frame);
        log::debug!(
            "early_signature: score={:.3} anomalies={}",
            result.score(),
            result.anomalies.len()
        );
        result
    }
}
