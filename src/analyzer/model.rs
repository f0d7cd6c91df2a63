//! Learned-model layer
//!
//! Two strategies behind one layer, chosen once at construction:
//!
//! - **Learned**: a [`ModelBackend`] (ONNX Runtime with the `onnx` feature)
//!   scores a 224x224 ImageNet-normalised tensor with a single sigmoid output.
//! - **Statistical**: a proxy for over-smoothed generator output.
//!   - blur: variance of the 3x3 Laplacian, `1 - min(var / 500, 1)`
//!   - entropy: 256-bin grayscale histogram entropy, `1 - min(H / 8, 1)`
//!   - score: `0.6 * blur + 0.4 * entropy`
//!
//! Callers hand over whatever they have through [`ModelInput`]; it is
//! resolved to one in-memory frame before any scoring. A failing backend
//! falls back to the statistical proxy for the same frame, and anything that
//! goes wrong before a frame exists yields the neutral 0.5.

use super::layer::{ForensicLayer, LayerId, LayerInput, LayerResult};
use crate::error::{Error, Result};
use crate::media;
use image::{imageops, GrayImage, Rgb, RgbImage};
use ndarray::Array4;
use std::borrow::Cow;
use std::path::Path;

pub const NEUTRAL_SCORE: f64 = 0.5;
pub const INPUT_SIZE: u32 = 224;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const SHARPNESS_REFERENCE: f64 = 500.0;
const ENTROPY_REFERENCE: f64 = 8.0;
const BLUR_WEIGHT: f64 = 0.6;
const ENTROPY_WEIGHT: f64 = 0.4;

/// Everything the layer accepts.
pub enum ModelInput<'a> {
    /// NCHW, batch 1, ImageNet-normalised.
    Tensor(Array4<f32>),
    Frame(&'a RgbImage),
    Path(&'a Path),
}

/// A trained classifier. Returns the probability that the input is synthetic.
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn predict(&self, tensor: &Array4<f32>) -> Result<f64>;
}

enum Strategy {
    Learned(Box<dyn ModelBackend>),
    Statistical,
}

pub struct LearnedModelLayer {
    strategy: Strategy,
}

impl Default for LearnedModelLayer {
    fn default() -> Self {
        Self::statistical()
    }
}

impl LearnedModelLayer {
    pub fn statistical() -> Self {
        Self {
            strategy: Strategy::Statistical,
        }
    }

    pub fn with_backend(backend: Box<dyn ModelBackend>) -> Self {
        Self {
            strategy: Strategy::Learned(backend),
        }
    }

    /// Load a model file if the runtime is compiled in; otherwise, or if
    /// loading fails, use the statistical proxy.
    pub fn from_model_path(path: &Path) -> Self {
        #[cfg(feature = "onnx")]
        {
            match onnx::OnnxBackend::load(path) {
                Ok(backend) => return Self::with_backend(Box::new(backend)),
                Err(e) => log::warn!("model: {} ({}), using statistical proxy", e, path.display()),
            }
        }
        #[cfg(not(feature = "onnx"))]
        {
            log::warn!(
                "model: {} ignored, built without the onnx feature; using statistical proxy",
                path.display()
            );
        }

        Self::statistical()
    }

    pub fn method(&self) -> &'static str {
        match &self.strategy {
            Strategy::Learned(backend) => backend.name(),
            Strategy::Statistical => "statistical",
        }
    }

    pub fn analyze_input(&self, input: ModelInput<'_>) -> LayerResult {
        let (frame, tensor): (Cow<'_, RgbImage>, Option<Array4<f32>>) = match input {
            ModelInput::Tensor(t) => match tensor_to_frame(&t) {
                Ok(f) => (Cow::Owned(f), Some(t)),
                Err(e) => return LayerResult::neutral(NEUTRAL_SCORE).with_error(e),
            },
            ModelInput::Frame(f) => (Cow::Borrowed(f), None),
            ModelInput::Path(p) => match media::decode_image(p) {
                Ok(f) => (Cow::Owned(f), None),
                Err(e) => {
                    log::warn!("model: cannot decode {}: {}", p.display(), e);
                    return LayerResult::neutral(NEUTRAL_SCORE).with_error(e);
                }
            },
        };

        if let Strategy::Learned(backend) = &self.strategy {
            let tensor = tensor.unwrap_or_else(|| frame_to_tensor(&frame));
            match backend.predict(&tensor) {
                Ok(p) => {
                    let mut result = LayerResult::neutral(p);
                    result.detail("method", backend.name());
                    return result;
                }
                Err(e) => log::warn!("model: {} backend failed ({}), using statistical proxy", backend.name(), e),
            }
        }

        match statistical_score(&frame) {
            Ok(stats) => {
                let mut result = LayerResult::neutral(stats.score);
                result.detail("method", "statistical");
                result.detail("laplacian_variance", stats.laplacian_variance);
                result.detail("entropy", stats.entropy);
                result
            }
            Err(e) => LayerResult::neutral(NEUTRAL_SCORE).with_error(e),
        }
    }
}

/// Intermediate values of the statistical proxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticalScore {
    pub laplacian_variance: f64,
    pub entropy: f64,
    pub score: f64,
}

pub fn statistical_score(frame: &RgbImage) -> Result<StatisticalScore> {
    if frame.width() < 3 || frame.height() < 3 {
        return Err(Error::Model(format!(
            "frame too small ({}x{})",
            frame.width(),
            frame.height()
        )));
    }
    let gray = imageops::grayscale(frame);
    let laplacian_variance = laplacian_variance(&gray);
    let entropy = histogram_entropy(&gray);

    let blur = 1.0 - (laplacian_variance / SHARPNESS_REFERENCE).min(1.0);
    let info = 1.0 - (entropy / ENTROPY_REFERENCE).min(1.0);

    Ok(StatisticalScore {
        laplacian_variance,
        entropy,
        score: (BLUR_WEIGHT * blur + ENTROPY_WEIGHT * info).clamp(0.0, 1.0),
    })
}

/// Variance of the 4-neighbour Laplacian, borders mirrored without
/// repeating the edge pixel.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    if w < 2 || h < 2 {
        return 0.0;
    }
    let reflect = |i: i64, n: i64| -> u32 {
        if i < 0 {
            (-i) as u32
        } else if i >= n {
            (2 * n - 2 - i) as u32
        } else {
            i as u32
        }
    };
    let px = |x: i64, y: i64| gray.get_pixel(reflect(x, w), reflect(y, h)).0[0] as f64;

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..h {
        for x in 0..w {
            let v = px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y);
            sum += v;
            sum_sq += v * v;
        }
    }
    let n = (w * h) as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Shannon entropy in bits of the 256-bin histogram.
pub fn histogram_entropy(gray: &GrayImage) -> f64 {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    let total = gray.pixels().len() as f64;
    if total == 0.0 {
        return 0.0;
    }
    hist.iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Resize to the model input size and normalise into NCHW.
pub fn frame_to_tensor(frame: &RgbImage) -> Array4<f32> {
    let resized = imageops::resize(frame, INPUT_SIZE, INPUT_SIZE, imageops::FilterType::Triangle);
    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, p) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (p.0[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    tensor
}

/// Undo [`frame_to_tensor`] normalisation so the statistical proxy can run
/// on tensor input.
pub fn tensor_to_frame(tensor: &Array4<f32>) -> Result<RgbImage> {
    let shape = tensor.shape();
    if shape[0] != 1 || shape[1] != 3 || shape[2] == 0 || shape[3] == 0 {
        return Err(Error::Model(format!("unexpected tensor shape {:?}", shape)));
    }
    let (h, w) = (shape[2] as u32, shape[3] as u32);
    Ok(RgbImage::from_fn(w, h, |x, y| {
        let mut rgb = [0u8; 3];
        for (c, v) in rgb.iter_mut().enumerate() {
            let n = tensor[[0, c, y as usize, x as usize]];
            *v = ((n * IMAGENET_STD[c] + IMAGENET_MEAN[c]) * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        Rgb(rgb)
    }))
}

impl ForensicLayer for LearnedModelLayer {
    fn id(&self) -> LayerId {
        LayerId::Model
    }

    fn analyze(&self, input: &LayerInput<'_>) -> LayerResult {
        let result = self.analyze_input(ModelInput::Frame(input.frame));
        log::debug!("model: method={} score={:.3}", self.method(), result.score());
        result
    }
}

#[cfg(feature = "onnx")]
pub mod onnx {
    //! ONNX Runtime backend.

    use super::ModelBackend;
    use crate::error::{Error, Result};
    use ndarray::Array4;
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use ort::value::Value;
    use parking_lot::Mutex;
    use std::path::Path;

    /// `Session::run` needs exclusive access, so the session sits behind a lock.
    pub struct OnnxBackend {
        session: Mutex<Session>,
        output_name: String,
    }

    impl OnnxBackend {
        pub fn load(path: &Path) -> Result<Self> {
            if !path.exists() {
                return Err(Error::Model(format!("model not found: {}", path.display())));
            }
            log::info!("Loading ONNX model from: {}", path.display());

            let session = Session::builder()
                .map_err(|e| Error::Model(format!("session builder: {}", e)))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| Error::Model(format!("optimization level: {}", e)))?
                .commit_from_file(path)
                .map_err(|e| Error::Model(format!("load failed: {}", e)))?;

            let output_name = session
                .outputs
                .first()
                .map(|o| o.name.clone())
                .ok_or_else(|| Error::Model("model defines no outputs".to_string()))?;

            Ok(Self {
                session: Mutex::new(session),
                output_name,
            })
        }
    }

    impl ModelBackend for OnnxBackend {
        fn name(&self) -> &'static str {
            "onnx"
        }

        fn predict(&self, tensor: &Array4<f32>) -> Result<f64> {
            let input = Value::from_array(tensor.clone())
                .map_err(|e| Error::Model(format!("tensor: {}", e)))?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| Error::Model(format!("inference failed: {}", e)))?;
            let output = outputs
                .get(&self.output_name)
                .ok_or_else(|| Error::Model("missing output".to_string()))?;
            let (_, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| Error::Model(format!("extract: {}", e)))?;

            data.first()
                .map(|&p| p as f64)
                .ok_or_else(|| Error::Model("empty output".to_string()))
        }
    }
}
