//! Frequency-domain forensics
//!
//! Three checks on the grayscale representative frame, each contributing a
//! fixed amount to the score when it crosses its threshold:
//!
//! | Check            | Contribution                         | Threshold | Adds |
//! |------------------|--------------------------------------|-----------|------|
//! | FFT grid         | 1 - spectral flatness outside r=20   | > 0.7     | 0.4  |
//! | Block transform  | [`FrameCheck`] (placeholder 0.5)     | > 0.6     | 0.3  |
//! | CFA absence      | [`FrameCheck`] (placeholder 0.8)     | > 0.75    | 0.5  |
//!
//! Upsampling layers in generators leave periodic "grid" energy: a few sharp
//! peaks in the high-frequency spectrum. Camera noise spreads evenly over the
//! same region. Spectral flatness separates the two without depending on
//! image size or exposure.
//! A magnitude mean against a fixed reference constant is not used: raw or
//! log, it rates broadband noise above a periodic grid.
//!
//! The block-transform and CFA checks are placeholders. The block check would
//! look for double quantization in 8x8 DCT coefficients; the CFA check for
//! the interpolation correlation a Bayer sensor leaves. Both ship as
//! [`NullCheck`] constants so a real detector can be dropped in.

use super::layer::{FrameCheck, ForensicLayer, LayerId, LayerInput, LayerResult, NullCheck};
use super::spectrum::{self, Spectrum};
use image::{imageops, GrayImage, RgbImage};
use std::f64::consts::PI;

const LOW_FREQ_RADIUS: f64 = 20.0;
const FFT_THRESHOLD: f64 = 0.7;
const FFT_WEIGHT: f64 = 0.4;
const BLOCK_THRESHOLD: f64 = 0.6;
const BLOCK_WEIGHT: f64 = 0.3;
const CFA_THRESHOLD: f64 = 0.75;
const CFA_WEIGHT: f64 = 0.5;
const MAX_SCORE: f64 = 0.99;

pub const BLOCK_PLACEHOLDER: NullCheck = NullCheck::new("block_transform", 0.5);
pub const CFA_PLACEHOLDER: NullCheck = NullCheck::new("cfa_absence", 0.8);

pub struct FrequencyMathLayer {
    block_check: Box<dyn FrameCheck>,
    cfa_check: Box<dyn FrameCheck>,
}

impl Default for FrequencyMathLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyMathLayer {
    pub fn new() -> Self {
        Self {
            block_check: Box::new(BLOCK_PLACEHOLDER),
            cfa_check: Box::new(CFA_PLACEHOLDER),
        }
    }

    pub fn with_block_check(mut self, check: Box<dyn FrameCheck>) -> Self {
        self.block_check = check;
        self
    }

    pub fn with_cfa_check(mut self, check: Box<dyn FrameCheck>) -> Self {
        self.cfa_check = check;
        self
    }

    pub fn analyze_frame(&self, frame: &RgbImage) -> LayerResult {
        let mut result = LayerResult::neutral(0.0);
        if frame.width() == 0 || frame.height() == 0 {
            return result.with_error("empty frame");
        }
        let gray = imageops::grayscale(frame);

        let fft = fft_grid_score(&gray);
        result.detail("fft_score", fft);
        if fft > FFT_THRESHOLD {
            result.flag("Strong periodic grid artifacts in frequency spectrum");
            result.add_score(FFT_WEIGHT);
        }

        result.detail("dct_mean_energy", block_dct_energy(&gray));
        let block = self.block_check.evaluate(frame);
        result.detail("dct_score", block);
        if block > BLOCK_THRESHOLD {
            result.flag("Abnormal block-transform coefficient distribution");
            result.add_score(BLOCK_WEIGHT);
        }

        let cfa = self.cfa_check.evaluate(frame);
        result.detail("cfa_absence_score", cfa);
        if cfa > CFA_THRESHOLD {
            result.flag("Missing CFA/Bayer pattern traces (direct RGB generation)");
            result.add_score(CFA_WEIGHT);
        }

        result.set_score(result.score().min(MAX_SCORE));
        result
    }
}

/// Peakiness of the high-frequency spectrum in [0, 1].
pub fn fft_grid_score(gray: &GrayImage) -> f64 {
    let spec = Spectrum::compute(gray);
    let outer = spec.outside_disk(LOW_FREQ_RADIUS);
    // A flat image has no high-frequency content at all, periodic or not
    if spectrum::mean(&outer) <= 1e-9 {
        return 0.0;
    }
    (1.0 - spectrum::spectral_flatness(&outer)).clamp(0.0, 1.0)
}

/// Mean absolute AC coefficient of the 8x8 DCT-II over the 8-aligned crop,
/// on pixel values scaled to [0, 1].
pub fn block_dct_energy(gray: &GrayImage) -> f64 {
    let w = (gray.width() / 8) * 8;
    let h = (gray.height() / 8) * 8;
    if w == 0 || h == 0 {
        return 0.0;
    }

    // basis[u][x] = c(u) * cos((2x + 1) u pi / 16)
    let mut basis = [[0.0f64; 8]; 8];
    for (u, row) in basis.iter_mut().enumerate() {
        let c = if u == 0 { (1.0f64 / 8.0).sqrt() } else { (2.0f64 / 8.0).sqrt() };
        for (x, v) in row.iter_mut().enumerate() {
            *v = c * (((2 * x + 1) as f64 * u as f64 * PI) / 16.0).cos();
        }
    }

    let mut total = 0.0;
    let mut count = 0usize;
    let mut block = [[0.0f64; 8]; 8];
    let mut rows = [[0.0f64; 8]; 8];

    for by in (0..h).step_by(8) {
        for bx in (0..w).step_by(8) {
            for (y, row) in block.iter_mut().enumerate() {
                for (x, v) in row.iter_mut().enumerate() {
                    *v = gray.get_pixel(bx + x as u32, by + y as u32).0[0] as f64 / 255.0;
                }
            }
            // Separable: rows, then columns
            for y in 0..8 {
                for u in 0..8 {
                    rows[y][u] = (0..8).map(|x| basis[u][x] * block[y][x]).sum();
                }
            }
            for v in 0..8 {
                for u in 0..8 {
                    if u == 0 && v == 0 {
                        continue;
                    }
                    let coeff: f64 = (0..8).map(|y| basis[v][y] * rows[y][u]).sum();
                    total += coeff.abs();
                    count += 1;
                }
            }
        }
    }

    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

impl ForensicLayer for FrequencyMathLayer {
    fn id(&self) -> LayerId {
        LayerId::Math
    }

    fn analyze(&self, input: &LayerInput<'_>) -> LayerResult {
        let result = self.analyze_frame(input.frame);
        log::debug!(
            "math: score={:.3} anomalies={}",
            result.score(),
            result.anomalies.len()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn checkerboard(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if ((x / 8) + (y / 8)) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn noise(size: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbImage::from_fn(size, size, |_, _| {
            let v: u8 = rng.gen();
            Rgb([v, v, v])
        })
    }

    // ==========================================================================
    // FFT GRID CHECK
    // ==========================================================================
    //
    // A checkerboard puts all of its high-frequency energy into a handful of
    // odd harmonics: spectral flatness near 0, score near 1. Uniform noise
    // spreads energy evenly; the Rayleigh-distributed magnitudes give a
    // flatness of about 0.85, so the score sits near 0.15.
    // ==========================================================================

    #[test]
    fn test_checkerboard_has_peaky_spectrum() {
        let gray = imageops::grayscale(&checkerboard(128));
        assert!(fft_grid_score(&gray) > 0.9);
    }

    #[test]
    fn test_noise_has_flat_spectrum() {
        let gray = imageops::grayscale(&noise(128, 7));
        let score = fft_grid_score(&gray);
        assert!(score < 0.4, "noise scored {}", score);
    }

    #[test]
    fn test_grid_score_ignores_contrast() {
        // A faint grid is as periodic as a strong one; loud noise stays flat
        let faint = GrayImage::from_fn(128, 128, |x, y| Luma([if ((x / 8) + (y / 8)) % 2 == 0 { 130 } else { 120 }]));
        let loud = imageops::grayscale(&noise(128, 21));
        assert!(fft_grid_score(&faint) > 0.9);
        assert!(fft_grid_score(&loud) < fft_grid_score(&faint));
    }

    #[test]
    fn test_constant_image_scores_zero() {
        let gray = GrayImage::from_pixel(64, 64, Luma([128]));
        assert_eq!(fft_grid_score(&gray), 0.0);
    }

    // ==========================================================================
    // LAYER SCORING
    // ==========================================================================

    #[test]
    fn test_checkerboard_outscores_noise() {
        let layer = FrequencyMathLayer::new();
        let grid = layer.analyze_frame(&checkerboard(128));
        let rand = layer.analyze_frame(&noise(128, 42));

        assert!(grid.score() > rand.score());
        assert!((grid.score() - 0.9).abs() < 1e-9);
        assert!((rand.score() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_placeholders_flag_cfa_only() {
        let result = FrequencyMathLayer::new().analyze_frame(&noise(64, 1));
        assert_eq!(
            result.anomalies,
            vec!["Missing CFA/Bayer pattern traces (direct RGB generation)"]
        );
        assert_eq!(result.details["dct_score"], 0.5);
        assert_eq!(result.details["cfa_absence_score"], 0.8);
    }

    #[test]
    fn test_score_is_capped() {
        let layer = FrequencyMathLayer::new()
            .with_block_check(Box::new(NullCheck::new("block_transform", 0.9)));
        let result = layer.analyze_frame(&checkerboard(128));
        // 0.4 + 0.3 + 0.5 would be 1.2
        assert!((result.score() - MAX_SCORE).abs() < 1e-9);
        assert_eq!(result.anomalies.len(), 3);
    }

    #[test]
    fn test_swapped_cfa_check_silences_flag() {
        let layer = FrequencyMathLayer::new().with_cfa_check(Box::new(NullCheck::new("cfa_absence", 0.1)));
        let result = layer.analyze_frame(&noise(64, 3));
        assert!(result.anomalies.is_empty());
        assert_eq!(result.score(), 0.0);
    }

    #[test]
    fn test_empty_frame_is_contained() {
        let result = FrequencyMathLayer::new().analyze_frame(&RgbImage::new(0, 0));
        assert_eq!(result.score(), 0.0);
        assert_eq!(result.details["error"], "empty frame");
    }

    // ==========================================================================
    // BLOCK DCT
    // ==========================================================================

    #[test]
    fn test_dct_energy_of_flat_image_is_zero() {
        let gray = GrayImage::from_pixel(32, 32, Luma([200]));
        assert!(block_dct_energy(&gray) < 1e-9);
    }

    #[test]
    fn test_dct_energy_grows_with_texture() {
        let flat = GrayImage::from_pixel(32, 32, Luma([100]));
        let busy = imageops::grayscale(&noise(32, 9));
        assert!(block_dct_energy(&busy) > block_dct_energy(&flat));
    }

    #[test]
    fn test_dct_ignores_partial_blocks() {
        assert_eq!(block_dct_energy(&GrayImage::new(7, 30)), 0.0);
    }
}
