//! Face region detection
//!
//! The biology layer only needs a rough box around the largest face in a
//! frame, so the default detector segments skin-coloured pixels in YCbCr
//! space instead of running a trained cascade:
//!
//! 1. Split the frame into 8x8 cells.
//! 2. A cell is "skin" when most of its pixels fall inside the skin chroma
//!    range (Cb 77..=127, Cr 133..=173). Chroma is used alone so the test
//!    works across lighting levels.
//! 3. Join neighbouring skin cells into 4-connected components.
//! 4. Keep components that are big enough and roughly face-shaped
//!    (aspect ratio between 0.5 and 2), largest first.
//!
//! A proper detector plugs in through [`FaceDetector`].

use image::RgbImage;
use serde::Serialize;

const CELL: u32 = 8;
const CB_RANGE: (f64, f64) = (77.0, 127.0);
const CR_RANGE: (f64, f64) = (133.0, 173.0);
/// Fraction of skin pixels for a cell to count as skin.
const CELL_SKIN_RATIO: f64 = 0.6;
/// Smallest face, in cells.
const MIN_CELLS: usize = 6;
const MIN_ASPECT: f64 = 0.5;
const MAX_ASPECT: f64 = 2.0;

/// Axis-aligned face box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    /// Mean of one colour channel inside the region, clipped to the frame.
    pub fn channel_mean(&self, frame: &RgbImage, channel: usize) -> Option<f64> {
        let x_end = (self.x + self.width).min(frame.width());
        let y_end = (self.y + self.height).min(frame.height());
        if self.x >= x_end || self.y >= y_end || channel > 2 {
            return None;
        }

        let mut sum = 0u64;
        for y in self.y..y_end {
            for x in self.x..x_end {
                sum += frame.get_pixel(x, y).0[channel] as u64;
            }
        }
        let count = ((x_end - self.x) * (y_end - self.y)) as f64;
        Some(sum as f64 / count)
    }
}

pub trait FaceDetector: Send + Sync {
    /// Faces in the frame, largest first.
    fn detect(&self, frame: &RgbImage) -> Vec<FaceRegion>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SkinToneDetector;

impl SkinToneDetector {
    fn skin_grid(frame: &RgbImage) -> (Vec<bool>, usize, usize) {
        let cols = (frame.width() / CELL) as usize;
        let rows = (frame.height() / CELL) as usize;
        let mut grid = vec![false; cols * rows];

        for row in 0..rows {
            for col in 0..cols {
                let mut skin = 0u32;
                for dy in 0..CELL {
                    for dx in 0..CELL {
                        let p = frame.get_pixel(col as u32 * CELL + dx, row as u32 * CELL + dy);
                        if is_skin(p.0) {
                            skin += 1;
                        }
                    }
                }
                grid[row * cols + col] = skin as f64 / (CELL * CELL) as f64 >= CELL_SKIN_RATIO;
            }
        }

        (grid, cols, rows)
    }
}

impl FaceDetector for SkinToneDetector {
    fn detect(&self, frame: &RgbImage) -> Vec<FaceRegion> {
        let (grid, cols, rows) = Self::skin_grid(frame);
        let mut seen = vec![false; grid.len()];
        let mut faces = Vec::new();

        for start in 0..grid.len() {
            if !grid[start] || seen[start] {
                continue;
            }

            // Flood fill one component, tracking its bounding box
            let mut stack = vec![start];
            seen[start] = true;
            let mut cells = 0usize;
            let (mut min_c, mut max_c) = (usize::MAX, 0usize);
            let (mut min_r, mut max_r) = (usize::MAX, 0usize);

            while let Some(i) = stack.pop() {
                cells += 1;
                let (r, c) = (i / cols, i % cols);
                min_c = min_c.min(c);
                max_c = max_c.max(c);
                min_r = min_r.min(r);
                max_r = max_r.max(r);

                let mut visit = |j: usize| {
                    if grid[j] && !seen[j] {
                        seen[j] = true;
                        stack.push(j);
                    }
                };
                if c > 0 {
                    visit(i - 1);
                }
                if c + 1 < cols {
                    visit(i + 1);
                }
                if r > 0 {
                    visit(i - cols);
                }
                if r + 1 < rows {
                    visit(i + cols);
                }
            }

            if cells < MIN_CELLS {
                continue;
            }
            let w = (max_c - min_c + 1) as f64;
            let h = (max_r - min_r + 1) as f64;
            let aspect = w / h;
            if !(MIN_ASPECT..=MAX_ASPECT).contains(&aspect) {
                continue;
            }

            faces.push(FaceRegion {
                x: min_c as u32 * CELL,
                y: min_r as u32 * CELL,
                width: w as u32 * CELL,
                height: h as u32 * CELL,
            });
        }

        faces.sort_by(|a, b| b.area().cmp(&a.area()).then(a.y.cmp(&b.y)).then(a.x.cmp(&b.x)));
        faces
    }
}

/// ITU-R BT.601 chroma test.
fn is_skin([r, g, b]: [u8; 3]) -> bool {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let cb = 128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b;
    (CB_RANGE.0..=CB_RANGE.1).contains(&cb) && (CR_RANGE.0..=CR_RANGE.1).contains(&cr)
}

#[cfg(test)]
pub(crate) const SKIN: image::Rgb<u8> = image::Rgb([224, 172, 150]);
