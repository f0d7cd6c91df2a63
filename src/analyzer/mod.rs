//! Layered analysis pipeline
//!
//! The [`Orchestrator`] resolves one media file into a [`MediaSample`],
//! decodes a single representative frame, runs every layer that applies to
//! the media kind, and folds the layer scores into an [`AggregateReport`].
//!
//! # Plan
//!
//! | Layer            | Image | Video            | Weight |
//! |------------------|-------|------------------|--------|
//! | metadata         | yes   | yes (ffprobe)    | 0.10   |
//! | biology (rPPG)   | faces | 300-frame signal | 0.20   |
//! | math             | yes   | first frame      | 0.30   |
//! | model            | yes   | first frame      | 0.30   |
//! | physics          | yes   | skipped          | 0.05   |
//! | early signature  | yes   | first frame      | 0.05   |
//! | ELA              | yes   | skipped          | -      |
//!
//! Skipped layers are left out of both the numerator and the denominator of
//! the weighted mean, and out of `layer_scores`.
//!
//! # Verdict
//!
//! | Confidence   | Verdict      |
//! |--------------|--------------|
//! | > 0.75       | AI-Generated |
//! | > 0.40       | Suspicious   |
//! | otherwise    | Real         |

pub mod biology;
pub mod early_signature;
pub mod ela;
pub mod face;
pub mod frequency;
pub mod layer;
pub mod metadata;
pub mod model;
pub mod physics;
pub mod spectrum;

pub use biology::BiologicalLayer;
pub use early_signature::EarlySignatureLayer;
pub use ela::ElaLayer;
pub use face::{FaceDetector, FaceRegion, SkinToneDetector};
pub use frequency::FrequencyMathLayer;
pub use layer::{Details, ForensicLayer, FrameCheck, LayerId, LayerInput, LayerResult, NullCheck};
pub use metadata::MetadataLayer;
pub use model::{LearnedModelLayer, ModelBackend, ModelInput};
pub use physics::PhysicsLayer;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::media::{self, MediaKind, MediaSample, VideoTools};
use crate::provenance::ProvenanceVerifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const AI_GENERATED_THRESHOLD: f64 = 0.75;
const SUSPICIOUS_THRESHOLD: f64 = 0.4;
const AUTHENTIC_CEILING: f64 = 0.3;

/// Layers whose anomalies feed the explanation, in this order.
const EXPLAINING_LAYERS: [LayerId; 3] = [LayerId::Metadata, LayerId::Biology, LayerId::Math];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Real,
    Suspicious,
    #[serde(rename = "AI-Generated")]
    AIGenerated,
}

impl Verdict {
    /// Strict thresholds: exactly 0.75 is Suspicious, exactly 0.4 is Real.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > AI_GENERATED_THRESHOLD {
            Verdict::AIGenerated
        } else if confidence > SUSPICIOUS_THRESHOLD {
            Verdict::Suspicious
        } else {
            Verdict::Real
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Real => "Real",
            Verdict::Suspicious => "Suspicious",
            Verdict::AIGenerated => "AI-Generated",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final output of one analysis call.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub file_path: String,
    pub file_name: String,
    pub media_type: Option<MediaKind>,
    pub verdict: Verdict,
    pub confidence: f64,
    pub layer_scores: BTreeMap<String, f64>,
    pub explanation: String,
    pub details: BTreeMap<String, Details>,
    pub is_verified: bool,
    /// Manifest fields reported by the provenance verifier; empty when none.
    pub provenance: Value,
    pub auxiliary_image_ref: Option<String>,
}

impl AggregateReport {
    /// Report for input that could not be analysed at all.
    pub fn unreadable(path: &Path, media_type: Option<MediaKind>, reason: &str) -> Self {
        let mut input = Details::new();
        input.insert("error".to_string(), Value::from(reason));
        let mut details = BTreeMap::new();
        details.insert("input".to_string(), input);

        Self {
            file_path: path.to_string_lossy().to_string(),
            file_name: file_name(path),
            media_type,
            verdict: Verdict::Real,
            confidence: 0.0,
            layer_scores: BTreeMap::new(),
            explanation: format!("media could not be analysed: {}", reason),
            details,
            is_verified: false,
            provenance: Value::Object(Default::default()),
            auxiliary_image_ref: None,
        }
    }

    /// True when the input never reached the layers.
    pub fn is_unreadable(&self) -> bool {
        self.layer_scores.is_empty() && self.details.contains_key("input")
    }

    pub fn error(&self) -> Option<&str> {
        self.details
            .get("input")
            .and_then(|d| d.get("error"))
            .and_then(|v| v.as_str())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Weighted mean of the scores of the layers that ran, rounded to three
/// decimals. Unweighted layers are ignored; no weight at all gives 0.
pub fn aggregate(scores: &[(LayerId, f64)]) -> f64 {
    let (sum, total) = scores
        .iter()
        .filter_map(|(id, s)| id.weight().map(|w| (s * w, w)))
        .fold((0.0, 0.0), |(sum, total), (sw, w)| (sum + sw, total + w));

    if total <= 0.0 {
        return 0.0;
    }
    layer::round3(layer::clamp_unit(sum / total))
}

pub fn explain(verdict: Verdict, confidence: f64, anomalies: &[String]) -> String {
    if anomalies.is_empty() {
        if confidence < AUTHENTIC_CEILING {
            "No significant artifacts, appears authentic".to_string()
        } else {
            "No anomalies flagged but statistical models indicate potential manipulation".to_string()
        }
    } else {
        format!("Flagged as {} due to: {}", verdict, anomalies.join("; "))
    }
}

/// Fold per-layer results into the report.
pub fn assemble(sample: &MediaSample, results: &[(LayerId, LayerResult)]) -> AggregateReport {
    let mut layer_scores = BTreeMap::new();
    let mut details = BTreeMap::new();
    let mut weighted = Vec::new();

    for (id, result) in results {
        if id.weight().is_some() {
            layer_scores.insert(id.score_key().to_string(), result.score());
            weighted.push((*id, result.score()));
        }
        details.insert(id.details_key().to_string(), result.details.clone());
    }

    let anomalies: Vec<String> = EXPLAINING_LAYERS
        .iter()
        .filter_map(|want| results.iter().find(|(id, _)| id == want))
        .flat_map(|(_, r)| r.anomalies.iter().cloned())
        .collect();

    let confidence = aggregate(&weighted);
    let verdict = Verdict::from_confidence(confidence);
    let explanation = explain(verdict, confidence, &anomalies);

    let metadata = results.iter().find(|(id, _)| *id == LayerId::Metadata).map(|(_, r)| r);
    let is_verified = metadata
        .and_then(|r| r.details.get("provenance_verified"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let provenance = metadata
        .and_then(|r| r.details.get("provenance"))
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    let auxiliary_image_ref = results
        .iter()
        .find_map(|(_, r)| r.artifact.as_ref())
        .map(|p| p.to_string_lossy().to_string());

    AggregateReport {
        file_path: sample.path().to_string_lossy().to_string(),
        file_name: sample.file_name(),
        media_type: Some(sample.kind()),
        verdict,
        confidence,
        layer_scores,
        explanation,
        details,
        is_verified,
        provenance,
        auxiliary_image_ref,
    }
}

/// Pipeline context. Build once and share: every layer holds only immutable
/// configuration, so one orchestrator serves concurrent calls.
pub struct Orchestrator {
    metadata: MetadataLayer,
    biology: BiologicalLayer,
    math: FrequencyMathLayer,
    model: LearnedModelLayer,
    physics: PhysicsLayer,
    early_signature: EarlySignatureLayer,
    ela: ElaLayer,
    video: VideoTools,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            metadata: MetadataLayer::new(),
            biology: BiologicalLayer::new(),
            math: FrequencyMathLayer::new(),
            model: LearnedModelLayer::statistical(),
            physics: PhysicsLayer::new(),
            early_signature: EarlySignatureLayer::new(),
            ela: ElaLayer::new(),
            video: VideoTools::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut orchestrator = Self::new()
            .with_video_tools(VideoTools::new(settings.ffmpeg.clone(), settings.ffprobe.clone()));
        if let Some(ref model) = settings.model_path {
            orchestrator = orchestrator.with_model_path(model);
        }
        orchestrator
    }

    /// Write ELA visualizations here instead of next to the input.
    pub fn with_ela_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ela = self.ela.with_output_dir(dir);
        self
    }

    pub fn with_model_path(mut self, path: &Path) -> Self {
        self.model = LearnedModelLayer::from_model_path(path);
        self
    }

    pub fn with_model_backend(mut self, backend: Box<dyn ModelBackend>) -> Self {
        self.model = LearnedModelLayer::with_backend(backend);
        self
    }

    pub fn with_video_tools(mut self, tools: VideoTools) -> Self {
        self.metadata = self.metadata.with_video_tools(tools.clone());
        self.biology = self.biology.with_video_tools(tools.clone());
        self.video = tools;
        self
    }

    pub fn with_provenance_verifier(mut self, verifier: Arc<dyn ProvenanceVerifier>) -> Self {
        self.metadata = self.metadata.with_verifier(verifier);
        self
    }

    pub fn with_face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.biology = self.biology.with_detector(detector);
        self
    }

    pub fn with_math_layer(mut self, layer: FrequencyMathLayer) -> Self {
        self.math = layer;
        self
    }

    fn layers(&self) -> [&dyn ForensicLayer; 7] {
        [
            &self.metadata,
            &self.biology,
            &self.math,
            &self.model,
            &self.physics,
            &self.early_signature,
            &self.ela,
        ]
    }

    /// Layers that run for `kind`, in execution order.
    pub fn plan(&self, kind: MediaKind) -> Vec<LayerId> {
        self.layers()
            .iter()
            .filter(|l| l.supports(kind))
            .map(|l| l.id())
            .collect()
    }

    /// Run every applicable layer. Fails only when the input cannot be
    /// opened or no representative frame can be decoded.
    pub fn run_layers(&self, path: &Path) -> Result<(MediaSample, Vec<(LayerId, LayerResult)>)> {
        let sample = MediaSample::open(path)?;
        let frame = media::representative_frame(&sample, &self.video)?;
        let input = LayerInput {
            sample: &sample,
            frame: &frame,
        };

        let results = self
            .layers()
            .iter()
            .filter(|l| l.supports(sample.kind()))
            .map(|l| (l.id(), l.analyze(&input)))
            .collect();

        Ok((sample, results))
    }

    /// Analyse one file. Never fails: unreadable input yields
    /// [`AggregateReport::unreadable`].
    pub fn analyze<P: AsRef<Path>>(&self, path: P) -> AggregateReport {
        let path = path.as_ref();
        match self.run_layers(path) {
            Ok((sample, results)) => {
                let report = assemble(&sample, &results);
                log::info!(
                    "{}: {} (confidence {:.3})",
                    path.display(),
                    report.verdict,
                    report.confidence
                );
                report
            }
            Err(e) => {
                let reason = describe(&e);
                log::warn!("{}: {}", path.display(), reason);
                AggregateReport::unreadable(path, MediaKind::from_path(path), &reason)
            }
        }
    }
}

fn describe(error: &Error) -> String {
    match error {
        Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => "file not found".to_string(),
        Error::Io(e) => e.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn result_with(score: f64, anomalies: &[&str]) -> LayerResult {
        let mut r = LayerResult::neutral(score);
        for a in anomalies {
            r.flag(*a);
        }
        r
    }

    fn sample(dir: &tempfile::TempDir, name: &str, frame: &RgbImage) -> std::path::PathBuf {
        let path = dir.path().join(name);
        frame.save(&path).unwrap();
        path
    }

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
        RgbImage::from_fn(size, size, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
    }

    // ==========================================================================
    // VERDICT THRESHOLDS
    // ==========================================================================
    //
    // Both thresholds are strict: a confidence sitting exactly on a boundary
    // falls into the lower verdict.
    // ==========================================================================

    #[test]
    fn test_verdict_examples() {
        assert_eq!(Verdict::from_confidence(0.76), Verdict::AIGenerated);
        assert_eq!(Verdict::from_confidence(0.5), Verdict::Suspicious);
        assert_eq!(Verdict::from_confidence(0.1), Verdict::Real);
    }

    #[test]
    fn test_verdict_boundaries_are_strict() {
        assert_eq!(Verdict::from_confidence(0.75), Verdict::Suspicious);
        assert_eq!(Verdict::from_confidence(0.4), Verdict::Real);
        assert_eq!(Verdict::from_confidence(0.0), Verdict::Real);
        assert_eq!(Verdict::from_confidence(1.0), Verdict::AIGenerated);
    }

    #[test]
    fn test_verdict_serialization() {
        assert_eq!(serde_json::to_string(&Verdict::AIGenerated).unwrap(), "\"AI-Generated\"");
        assert_eq!(serde_json::to_string(&Verdict::Real).unwrap(), "\"Real\"");
        assert_eq!(Verdict::Suspicious.to_string(), "Suspicious");
    }

    // ==========================================================================
    // AGGREGATION
    // ==========================================================================

    #[test]
    fn test_aggregate_all_layers() {
        let scores = [
            (LayerId::Metadata, 0.3),
            (LayerId::Biology, 0.0),
            (LayerId::Math, 0.5),
            (LayerId::Model, 0.6),
            (LayerId::Physics, 0.0),
            (LayerId::EarlySignature, 0.2),
        ];
        // 0.03 + 0 + 0.15 + 0.18 + 0 + 0.01 over a total weight of 1.0
        assert_eq!(aggregate(&scores), 0.37);
    }

    #[test]
    fn test_aggregate_excludes_skipped_layers() {
        // Video: physics absent, so its weight is not in the denominator
        let scores = [
            (LayerId::Metadata, 1.0),
            (LayerId::Biology, 1.0),
            (LayerId::Math, 1.0),
            (LayerId::Model, 1.0),
            (LayerId::EarlySignature, 1.0),
        ];
        assert_eq!(aggregate(&scores), 1.0);

        let partial = [(LayerId::Math, 0.8), (LayerId::Model, 0.2)];
        assert_eq!(aggregate(&partial), 0.5);
    }

    #[test]
    fn test_aggregate_ignores_unweighted_and_empty() {
        assert_eq!(aggregate(&[]), 0.0);
        assert_eq!(aggregate(&[(LayerId::Ela, 1.0)]), 0.0);
        assert_eq!(aggregate(&[(LayerId::Ela, 1.0), (LayerId::Math, 0.2)]), 0.2);
    }

    #[test]
    fn test_explanations() {
        assert_eq!(
            explain(Verdict::Real, 0.1, &[]),
            "No significant artifacts, appears authentic"
        );
        assert_eq!(
            explain(Verdict::Real, 0.3, &[]),
            "No anomalies flagged but statistical models indicate potential manipulation"
        );
        assert_eq!(
            explain(Verdict::Suspicious, 0.5, &["a".to_string(), "b".to_string()]),
            "Flagged as Suspicious due to: a; b"
        );
    }

    #[test]
    fn test_assemble_video_omits_image_only_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"\0\0\0\x18ftypisom").unwrap();
        let sample = MediaSample::open(&path).unwrap();

        let results = vec![
            (LayerId::Metadata, result_with(0.3, &["meta"])),
            (LayerId::Biology, result_with(0.8, &["flat"])),
            (LayerId::Math, result_with(0.5, &["grid"])),
            (LayerId::Model, result_with(0.5, &[])),
            (LayerId::EarlySignature, result_with(0.0, &["ignored"])),
        ];
        let report = assemble(&sample, &results);

        assert!(!report.layer_scores.contains_key("physics"));
        assert!(!report.layer_scores.contains_key("ela"));
        assert_eq!(report.layer_scores.len(), 5);
        // (0.03 + 0.16 + 0.15 + 0.15 + 0) / 0.95
        assert_eq!(report.confidence, 0.516);
        assert_eq!(report.verdict, Verdict::Suspicious);
        assert_eq!(report.explanation, "Flagged as Suspicious due to: meta; flat; grid");
        assert_eq!(report.media_type, Some(MediaKind::Video));
        assert!(report.auxiliary_image_ref.is_none());
    }

    #[test]
    fn test_assemble_reads_provenance_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(&dir, "p.png", &RgbImage::new(4, 4));
        let sample = MediaSample::open(&path).unwrap();

        let mut meta = result_with(0.0, &[]);
        meta.detail("provenance_verified", true);
        meta.detail("provenance", serde_json::json!({"verified": true, "issuer": "CA"}));
        let report = assemble(&sample, &[(LayerId::Metadata, meta)]);

        assert!(report.is_verified);
        assert_eq!(report.provenance["issuer"], "CA");
    }

    // ==========================================================================
    // PLAN
    // ==========================================================================

    #[test]
    fn test_plan_by_media_kind() {
        let orchestrator = Orchestrator::new();
        assert_eq!(
            orchestrator.plan(MediaKind::Image),
            vec![
                LayerId::Metadata,
                LayerId::Biology,
                LayerId::Math,
                LayerId::Model,
                LayerId::Physics,
                LayerId::EarlySignature,
                LayerId::Ela,
            ]
        );
        assert_eq!(
            orchestrator.plan(MediaKind::Video),
            vec![
                LayerId::Metadata,
                LayerId::Biology,
                LayerId::Math,
                LayerId::Model,
                LayerId::EarlySignature,
            ]
        );
    }

    // ==========================================================================
    // END TO END
    // ==========================================================================

    #[test]
    fn test_unreadable_inputs_never_fail() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.jpg");
        std::fs::File::create(&empty).unwrap();
        let garbage = dir.path().join("garbage.png");
        std::fs::write(&garbage, b"definitely not a png").unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"hello").unwrap();

        let orchestrator = Orchestrator::new();
        for path in [empty, garbage, text, dir.path().join("missing.jpg")] {
            let report = orchestrator.analyze(&path);
            assert_eq!(report.confidence, 0.0, "{}", path.display());
            assert_eq!(report.verdict, Verdict::Real);
            assert!(report.layer_scores.is_empty());
            assert!(report.is_unreadable());
            assert!(report.explanation.starts_with("media could not be analysed"));
        }

        let missing = orchestrator.analyze(dir.path().join("missing.jpg"));
        assert_eq!(missing.error(), Some("file not found"));
    }

    #[test]
    fn test_image_runs_every_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(&dir, "noise.png", &noise(64, 5));
        let report = Orchestrator::new().analyze(&path);

        for key in ["metadata", "biology_rppg", "math_forensics", "ai_model", "physics", "early_signature"] {
            assert!(report.layer_scores.contains_key(key), "missing {}", key);
        }
        assert!(!report.layer_scores.contains_key("ela"));
        assert!((0.0..=1.0).contains(&report.confidence));
        let aux = PathBuf::from(report.auxiliary_image_ref.clone().unwrap());
        assert_eq!(aux.parent(), Some(dir.path()));
        assert!(aux.file_name().unwrap().to_string_lossy().starts_with("ela_noise_png_"));
        assert!(aux.exists());
        assert!(report.details["ela"].contains_key("avg_ela_brightness"));
    }

    #[test]
    fn test_checkerboard_scores_higher_than_noise() {
        let dir = tempfile::tempdir().unwrap();
        let grid = sample(&dir, "grid.png", &checkerboard(128));
        let rand = sample(&dir, "rand.png", &noise(128, 99));

        let orchestrator = Orchestrator::new();
        let grid_score = orchestrator.analyze(&grid).layer_scores["math_forensics"];
        let rand_score = orchestrator.analyze(&rand).layer_scores["math_forensics"];
        assert!(grid_score > rand_score, "{} <= {}", grid_score, rand_score);
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(&dir, "same.png", &noise(48, 3));
        let orchestrator = Orchestrator::new().with_ela_dir(dir.path().join("ela"));
        std::fs::create_dir_all(dir.path().join("ela")).unwrap();

        let first = orchestrator.analyze(&path);
        let second = orchestrator.analyze(&path);
        assert_eq!(first.layer_scores, second.layer_scores);
        assert_eq!(first.verdict, second.verdict);
        assert_eq!(first.confidence, second.confidence);
    }

    #[test]
    fn test_same_stem_inputs_get_their_own_visualization() {
        let dir = tempfile::tempdir().unwrap();
        let png = sample(&dir, "shot.png", &noise(48, 11));
        let jpg = sample(&dir, "shot.jpg", &checkerboard(64));

        let orchestrator = Orchestrator::new();
        let a = orchestrator.analyze(&png).auxiliary_image_ref.unwrap();
        let b = orchestrator.analyze(&jpg).auxiliary_image_ref.unwrap();
        assert_ne!(a, b);
        assert_eq!(image::open(&a).unwrap().width(), 48);
        assert_eq!(image::open(&b).unwrap().width(), 64);
    }

    #[test]
    fn test_input_file_is_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(&dir, "keep.png", &noise(32, 8));
        Orchestrator::new().analyze(&path);
        assert!(path.exists());
    }
}
