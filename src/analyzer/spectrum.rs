//! 2-D frequency spectrum of a grayscale frame
//!
//! Rows are transformed first, then columns, with `rustfft`. The magnitude
//! grid is shifted so the zero frequency sits at `(height / 2, width / 2)`,
//! which makes "low frequencies" a disk around the centre.
//!
//! ```text
//!   +-------------------+
//!   |  high    high     |
//!   |      .-----.      |
//!   |     (  low  )     |   radius r: everything inside is masked out
//!   |      '-----'      |
//!   |  high    high     |
//!   +-------------------+
//! ```

use image::GrayImage;
use rustfft::{num_complex::Complex, FftPlanner};

/// Shifted magnitude spectrum, row-major.
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub width: usize,
    pub height: usize,
    pub magnitudes: Vec<f64>,
}

impl Spectrum {
    pub fn compute(gray: &GrayImage) -> Self {
        let width = gray.width() as usize;
        let height = gray.height() as usize;

        if width == 0 || height == 0 {
            return Self {
                width,
                height,
                magnitudes: Vec::new(),
            };
        }

        let mut data: Vec<Complex<f64>> = gray
            .pixels()
            .map(|p| Complex::new(p.0[0] as f64, 0.0))
            .collect();

        let mut planner = FftPlanner::new();

        let row_fft = planner.plan_fft_forward(width);
        for row in data.chunks_mut(width) {
            row_fft.process(row);
        }

        let col_fft = planner.plan_fft_forward(height);
        let mut column = vec![Complex::new(0.0, 0.0); height];
        for x in 0..width {
            for y in 0..height {
                column[y] = data[y * width + x];
            }
            col_fft.process(&mut column);
            for y in 0..height {
                data[y * width + x] = column[y];
            }
        }

        // fftshift
        let mut magnitudes = vec![0.0; width * height];
        let (half_w, half_h) = (width / 2, height / 2);
        for y in 0..height {
            let sy = (y + half_h) % height;
            for x in 0..width {
                let sx = (x + half_w) % width;
                magnitudes[sy * width + sx] = data[y * width + x].norm();
            }
        }

        Self {
            width,
            height,
            magnitudes,
        }
    }

    /// Magnitudes strictly outside a centred disk of `radius` pixels.
    pub fn outside_disk(&self, radius: f64) -> Vec<f64> {
        let cx = (self.width / 2) as f64;
        let cy = (self.height / 2) as f64;
        let r2 = radius * radius;

        let mut out = Vec::new();
        for y in 0..self.height {
            let dy = y as f64 - cy;
            for x in 0..self.width {
                let dx = x as f64 - cx;
                if dx * dx + dy * dy > r2 {
                    out.push(self.magnitudes[y * self.width + x]);
                }
            }
        }
        out
    }
}

/// Natural-log magnitude in the `20 * ln(|F| + eps)` convention.
pub fn log_magnitude(magnitude: f64, eps: f64) -> f64 {
    20.0 * (magnitude + eps).ln()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Spectral flatness (Wiener entropy): geometric mean over arithmetic mean.
/// 1.0 for a flat, noise-like spectrum; near 0 when energy sits in a few peaks.
pub fn spectral_flatness(magnitudes: &[f64]) -> f64 {
    if magnitudes.is_empty() {
        return 0.0;
    }

    let n = magnitudes.len() as f64;
    let log_sum: f64 = magnitudes.iter().map(|&x| (x + 1e-10).ln()).sum();
    let geo_mean = (log_sum / n).exp();
    let arith_mean = magnitudes.iter().sum::<f64>() / n;

    if arith_mean <= 0.0 {
        return 0.0;
    }

    (geo_mean / arith_mean).min(1.0)
}
