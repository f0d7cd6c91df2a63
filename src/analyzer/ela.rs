//! Error Level Analysis
//!
//! Re-encode the frame as JPEG at quality 95 and look at what changed.
//! Regions that were already compressed at that level barely move; pasted or
//! regenerated regions compress differently and light up. The raw difference
//! is faint, so it is amplified by `10 * 255 / max_difference` and written
//! out as a PNG for a human to inspect.
//!
//! The re-encoded copy never touches the disk. The only file written is the
//! visualization, `ela_<stem>_<ext>_<id>.png`, where `<id>` is a fresh UUID
//! so every call gets its own file.

use super::layer::{FrameCheck, ForensicLayer, LayerId, LayerInput, LayerResult, NullCheck};
use crate::error::Result;
use crate::media::MediaKind;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageFormat, Rgb, RgbImage};
use std::path::{Path, PathBuf};

pub const JPEG_QUALITY: u8 = 95;
const AMPLIFICATION: f64 = 10.0;
const ARTIFACT_PREFIX: &str = "ela_";

/// True for file names produced by [`ElaLayer::artifact_path`].
pub fn is_artifact_name(name: &str) -> bool {
    let body = match name.strip_prefix(ARTIFACT_PREFIX).and_then(|n| n.strip_suffix(".png")) {
        Some(b) => b,
        None => return false,
    };
    match body.rsplit_once('_') {
        Some((rest, id)) => {
            rest.contains('_') && id.len() == 32 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        }
        None => false,
    }
}

pub const ELA_PLACEHOLDER: NullCheck = NullCheck::new("ela_regions", 0.0);

/// Amplified difference image plus the numbers derived from it.
pub struct ElaMap {
    pub image: RgbImage,
    pub max_difference: u8,
    pub avg_brightness: f64,
}

pub struct ElaLayer {
    output_dir: Option<PathBuf>,
    region_check: Box<dyn FrameCheck>,
}

impl Default for ElaLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl ElaLayer {
    pub fn new() -> Self {
        Self {
            output_dir: None,
            region_check: Box::new(ELA_PLACEHOLDER),
        }
    }

    /// Directory for visualizations. Unset means next to the input file.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_region_check(mut self, check: Box<dyn FrameCheck>) -> Self {
        self.region_check = check;
        self
    }

    /// A new, unused path for the visualization of `input`.
    pub fn artifact_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "frame".to_string());
        let ext = input
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let dir = match &self.output_dir {
            Some(d) => d.clone(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let id = uuid::Uuid::new_v4().simple().to_string();
        dir.join(format!("{}{}_{}_{}.png", ARTIFACT_PREFIX, stem, ext, id))
    }

    pub fn analyze_frame(&self, frame: &RgbImage, input: &Path) -> LayerResult {
        let map = match ela_map(frame) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("ela: {}: {}", input.display(), e);
                return LayerResult::neutral(0.0).with_error(e);
            }
        };

        let mut result = LayerResult::neutral(self.region_check.evaluate(&map.image));
        result.detail("max_difference", map.max_difference);
        result.detail("avg_ela_brightness", map.avg_brightness);

        let out = self.artifact_path(input);
        match map.image.save(&out) {
            Ok(()) => {
                result.detail("ela_image", out.to_string_lossy().to_string());
                result.artifact = Some(out);
            }
            Err(e) => {
                log::warn!("ela: cannot write {}: {}", out.display(), e);
                result = result.with_error(e);
            }
        }
        result
    }
}

/// Re-encode in memory and build the amplified difference image.
pub fn ela_map(frame: &RgbImage) -> Result<ElaMap> {
    let (w, h) = frame.dimensions();

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY).encode(frame.as_raw(), w, h, ColorType::Rgb8)?;
    let resaved = image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)?.to_rgb8();

    let mut diff = RgbImage::new(w, h);
    let mut max_difference = 0u8;
    for (x, y, p) in frame.enumerate_pixels() {
        let q = resaved.get_pixel(x, y);
        let d = [
            p.0[0].abs_diff(q.0[0]),
            p.0[1].abs_diff(q.0[1]),
            p.0[2].abs_diff(q.0[2]),
        ];
        max_difference = max_difference.max(d[0]).max(d[1]).max(d[2]);
        diff.put_pixel(x, y, Rgb(d));
    }

    // Identical re-encode: nothing to amplify, avoid dividing by zero
    let divisor = if max_difference == 0 { 1.0 } else { max_difference as f64 };
    let factor = AMPLIFICATION * 255.0 / divisor;

    let mut total = 0u64;
    for p in diff.pixels_mut() {
        for c in p.0.iter_mut() {
            *c = (*c as f64 * factor).round().min(255.0) as u8;
            total += *c as u64;
        }
    }
    let channels = (w as u64 * h as u64 * 3).max(1);

    Ok(ElaMap {
        image: diff,
        max_difference,
        avg_brightness: total as f64 / channels as f64,
    })
}

impl ForensicLayer for ElaLayer {
    fn id(&self) -> LayerId {
        LayerId::Ela
    }

    fn supports(&self, kind: MediaKind) -> bool {
        kind == MediaKind::Image
    }

    fn analyze(&self, input: &LayerInput<'_>) -> LayerResult {
        let result = self.analyze_frame(input.frame, input.sample.path());
        log::debug!("ela: artifact={:?}", result.artifact);
        result
    }
}
