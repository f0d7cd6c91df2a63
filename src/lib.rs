//! Fakescope - Layered forensics for AI-generated and manipulated media
//!
//! Fakescope analyzes an image or video and estimates how likely it is to be
//! synthetic or manipulated, with a per-layer breakdown and a plain-language
//! explanation of what was flagged.
//!
//! # Overview
//!
//! No single signal separates generated media from camera output, so several
//! independent layers each look at one kind of evidence and the orchestrator
//! folds their scores into one weighted confidence. Each layer reports a score
//! in [0, 1] (0 = authentic signal, 1 = strong synthetic signal), free-form
//! details, and human-readable anomalies.
//!
//! # Detection Layers
//!
//! 1. **Metadata**: Container tags, editing software and provenance
//!    manifests. Generated and laundered files tend to carry almost no tags.
//!
//! 2. **Biological (rPPG)**: Green-channel intensity over a face across video
//!    frames. A living face pulses with the heartbeat; a rendered one is often
//!    perfectly flat.
//!
//! 3. **Frequency math**: FFT grid artifacts, 8x8 block-transform energy and
//!    the absence of camera colour-filter-array traces.
//!
//! 4. **Learned model**: An ONNX classifier when one is configured, otherwise
//!    a statistical proxy built on sharpness and entropy.
//!
//! 5. **Physics**: Lighting-direction consistency (recorded only).
//!
//! 6. **Early signature**: High-frequency spectral peaks left by upsamplers.
//!
//! 7. **Error Level Analysis**: A JPEG re-encode difference image for human
//!    inspection. It does not contribute to the score.
//!
//! # Quick Start
//!
//! ```no_run
//! use fakescope::{Orchestrator, Verdict};
//!
//! let orchestrator = Orchestrator::new();
//! let report = orchestrator.analyze("suspicious.jpg");
//!
//! match report.verdict {
//!     Verdict::Real => println!("Looks authentic"),
//!     Verdict::Suspicious => println!("Something's off - investigate"),
//!     Verdict::AIGenerated => println!("Very likely synthetic"),
//! }
//!
//! println!("Confidence: {:.3}", report.confidence);
//! println!("Why: {}", report.explanation);
//! println!("Layers: {:?}", report.layer_scores);
//! ```
//!
//! # Scoring System
//!
//! The confidence is the weighted mean of the layers that ran:
//!
//! | Confidence | Verdict | Meaning |
//! |------------|---------|---------|
//! | 0 - 0.40 | Real | No meaningful synthetic evidence |
//! | above 0.40 | Suspicious | Some layers disagree with a camera origin |
//! | above 0.75 | AI-Generated | Strong, consistent synthetic evidence |
//!
//! # Modules
//!
//! - [`analyzer`]: The layers and the orchestrator that combines them
//! - [`media`]: Media kinds, image decoding and ffmpeg-backed video frames
//! - [`container`]: JPEG/PNG/WebP/EXIF walkers feeding the metadata layer
//! - [`provenance`]: Content-credential manifest inspection
//! - [`report`]: Output formatters (JSON, CSV)
//! - [`db`]: SQLite analysis history
//! - [`serve`]: HTTP upload API

pub mod analyzer;
pub mod config;
pub mod container;
pub mod db;
pub mod error;
pub mod media;
pub mod provenance;
pub mod report;
pub mod schema;
pub mod serve;

pub use analyzer::{AggregateReport, LayerId, LayerResult, Orchestrator, Verdict};
pub use config::Settings;
pub use db::{Database, DbRecord, DbSummary};
pub use error::{Error, Result};
pub use media::{MediaKind, MediaSample};

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // PUBLIC API TESTS
    // ==========================================================================
    //
    // These tests verify the public API surface is correct and documented.
    // ==========================================================================

    #[test]
    fn test_public_exports() {
        // Verify core types are re-exported from crate root
        let _: Verdict = Verdict::Real;
        let _orchestrator = Orchestrator::new();
        let _settings = Settings::default();
        let _: Option<MediaKind> = MediaKind::from_extension("png");
    }

    #[test]
    fn test_verdict_variants() {
        // All verdict variants should be accessible
        let _ = Verdict::Real;
        let _ = Verdict::Suspicious;
        let _ = Verdict::AIGenerated;
    }

    #[test]
    fn test_unreadable_report_from_root() {
        let report = Orchestrator::new().analyze("/no/such/file.png");
        assert_eq!(report.verdict, Verdict::Real);
        assert_eq!(report.confidence, 0.0);
        assert!(report.layer_scores.is_empty());
    }
}
