//! Shared layer contract
//!
//! Every forensic layer turns one [`LayerInput`] into one [`LayerResult`].
//! A layer never fails: whatever goes wrong inside it is recorded in
//! `details` and the layer falls back to its neutral score.

use crate::media::{MediaKind, MediaSample};
use image::RgbImage;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Free-form diagnostic payload. Ordered so reports serialize identically
/// across runs.
pub type Details = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerId {
    Metadata,
    Biology,
    Math,
    Model,
    Physics,
    EarlySignature,
    Ela,
}

impl LayerId {
    /// Key used in `AggregateReport::layer_scores`.
    pub fn score_key(&self) -> &'static str {
        match self {
            LayerId::Metadata => "metadata",
            LayerId::Biology => "biology_rppg",
            LayerId::Math => "math_forensics",
            LayerId::Model => "ai_model",
            LayerId::Physics => "physics",
            LayerId::EarlySignature => "early_signature",
            LayerId::Ela => "ela",
        }
    }

    /// Key used in `AggregateReport::details`.
    pub fn details_key(&self) -> &'static str {
        match self {
            LayerId::Metadata => "metadata",
            LayerId::Biology => "biology",
            LayerId::Math => "math",
            LayerId::Model => "model",
            LayerId::Physics => "physics",
            LayerId::EarlySignature => "early_signature",
            LayerId::Ela => "ela",
        }
    }

    /// Relative trust in the aggregate. ELA carries no weight: its value is
    /// the visualization.
    pub fn weight(&self) -> Option<f64> {
        match self {
            LayerId::Metadata => Some(0.1),
            LayerId::Biology => Some(0.2),
            LayerId::Math => Some(0.3),
            LayerId::Model => Some(0.3),
            LayerId::Physics => Some(0.05),
            LayerId::EarlySignature => Some(0.05),
            LayerId::Ela => None,
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.score_key())
    }
}

/// Output of one layer. `score` is 0 for an authentic signal, 1 for a
/// strong synthetic signal, and always lies in [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayerResult {
    score: f64,
    pub details: Details,
    pub anomalies: Vec<String>,
    /// File written by the layer for display (ELA only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl LayerResult {
    /// Neutral result with the given score.
    pub fn neutral(score: f64) -> Self {
        let mut result = Self::default();
        result.set_score(score);
        result
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn set_score(&mut self, score: f64) {
        self.score = clamp_unit(score);
    }

    pub fn add_score(&mut self, delta: f64) {
        self.set_score(self.score + delta);
    }

    pub fn flag(&mut self, anomaly: impl Into<String>) {
        self.anomalies.push(anomaly.into());
    }

    pub fn detail(&mut self, key: &str, value: impl Into<Value>) {
        self.details.insert(key.to_string(), value.into());
    }

    /// Record a contained failure and return the result unchanged otherwise.
    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.detail("error", error.to_string());
        self
    }
}

/// Clamp into [0, 1]; NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Round to three decimals, the precision reported scores are given in.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Everything a layer may look at for one sample.
pub struct LayerInput<'a> {
    pub sample: &'a MediaSample,
    /// Representative frame, decoded once by the orchestrator.
    pub frame: &'a RgbImage,
}

pub trait ForensicLayer: Send + Sync {
    fn id(&self) -> LayerId;

    /// Whether this layer runs for the given media kind.
    fn supports(&self, _kind: MediaKind) -> bool {
        true
    }

    fn analyze(&self, input: &LayerInput<'_>) -> LayerResult;
}

/// A scalar heuristic over a decoded frame, used for the checks that are
/// still placeholders so that a real detector can be swapped in.
pub trait FrameCheck: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, frame: &RgbImage) -> f64;
}

/// Check that always reports the same value.
#[derive(Debug, Clone, Copy)]
pub struct NullCheck {
    name: &'static str,
    value: f64,
}

impl NullCheck {
    pub const fn new(name: &'static str, value: f64) -> Self {
        Self { name, value }
    }
}

impl FrameCheck for NullCheck {
    fn name(&self) -> &'static str {
        self.name
    }

    fn evaluate(&self, _frame: &RgbImage) -> f64 {
        self.value
    }
}
