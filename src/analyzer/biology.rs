//! Biological signal layer (rPPG)
//!
//! Blood flow makes skin colour pulse very slightly with the heartbeat. The
//! green channel carries the strongest share of that signal, so for video we
//! track the mean green level of the face across frames:
//!
//! ```text
//!   real face      ~~/\~~/\~~/\~~    small but nonzero variation
//!   generated      ______________    flatline: std dev < 0.5
//!   bad lighting   /\/\/\/\/\/\/\    std dev > 10, ambiguous
//! ```
//!
//! A still image has no time axis, so the image path only counts faces.

use super::face::{FaceDetector, SkinToneDetector};
use super::layer::{ForensicLayer, LayerId, LayerInput, LayerResult};
use super::spectrum;
use crate::media::{MediaKind, VideoTools};
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;

pub const MAX_FRAMES: usize = 300;
const MIN_VALID_SAMPLES: usize = 30;
const FLATLINE_STD: f64 = 0.5;
const NOISY_STD: f64 = 10.0;
const FLATLINE_PENALTY: f64 = 0.8;
const GREEN: usize = 1;

pub struct BiologicalLayer {
    detector: Arc<dyn FaceDetector>,
    video: VideoTools,
    max_frames: usize,
}

impl Default for BiologicalLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl BiologicalLayer {
    pub fn new() -> Self {
        Self {
            detector: Arc::new(SkinToneDetector),
            video: VideoTools::default(),
            max_frames: MAX_FRAMES,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_video_tools(mut self, tools: VideoTools) -> Self {
        self.video = tools;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames.clamp(1, MAX_FRAMES);
        self
    }

    pub fn analyze_video(&self, path: &Path) -> LayerResult {
        let frames = match self.video.frames(path, self.max_frames) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("biology: cannot open {}: {}", path.display(), e);
                let mut result = LayerResult::neutral(0.0).with_error(e);
                result.flag("Could not open video file");
                return result;
            }
        };

        let mut sampled = 0usize;
        let mut signal = Vec::new();
        for frame in frames {
            sampled += 1;
            if let Some(g) = self.green_level(&frame) {
                signal.push(g);
            }
        }

        score_signal(sampled, &signal)
    }

    pub fn analyze_image(&self, frame: &RgbImage) -> LayerResult {
        let mut result = LayerResult::neutral(0.0);
        let faces = self.detector.detect(frame);
        result.detail("faces_found", faces.len());
        result
    }

    /// Mean green level of the first detected face; `None` when no face.
    fn green_level(&self, frame: &RgbImage) -> Option<f64> {
        self.detector
            .detect(frame)
            .first()
            .and_then(|face| face.channel_mean(frame, GREEN))
    }
}

/// Turn a per-frame green signal into a layer result. Frames without a face
/// have already been dropped from `signal`.
pub fn score_signal(frames_sampled: usize, signal: &[f64]) -> LayerResult {
    let mut result = LayerResult::neutral(0.0);
    result.detail("frames_sampled", frames_sampled);
    result.detail("valid_samples", signal.len());

    if signal.len() < MIN_VALID_SAMPLES {
        result.flag("Insufficient face data for rPPG");
        return result;
    }

    let std = spectrum::std_dev(signal);
    result.detail("signal_std_dev", std);

    if std < FLATLINE_STD {
        result.flag("Unnaturally stable skin tone (flatline)");
        result.add_score(FLATLINE_PENALTY);
    } else if std > NOISY_STD {
        result.flag("Excessive noise in skin tone");
    }

    result
}

impl ForensicLayer for BiologicalLayer {
    fn id(&self) -> LayerId {
        LayerId::Biology
    }

    fn analyze(&self, input: &LayerInput<'_>) -> LayerResult {
        let result = match input.sample.kind() {
            MediaKind::Video => self.analyze_video(input.sample.path()),
            MediaKind::Image => self.analyze_image(input.frame),
        };
        log::debug!(
            "biology: score={:.3} anomalies={}",
            result.score(),
            result.anomalies.len()
        );
        result
    }
}
