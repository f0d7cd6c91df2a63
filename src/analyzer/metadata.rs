//! Metadata layer
//!
//! Looks at what the file says about itself rather than at its pixels:
//! - How much technical metadata is embedded. Camera files carry dozens of
//!   EXIF tags; generated or stripped files carry almost none.
//! - Which software last wrote it. A known editor is a weak manipulation hint.
//! - Whether a provenance manifest is embedded and verifies. A verified
//!   manifest overrides every other metadata hint.
//!
//! Metadata is easy to strip or forge, so this layer never scores above 0.4.

use super::layer::{ForensicLayer, LayerId, LayerInput, LayerResult};
use crate::container::{self, ContainerFormat};
use crate::media::{MediaKind, VideoTools};
use crate::provenance::{ManifestProbe, ProvenanceVerifier};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

const MIN_TAG_COUNT: usize = 5;
const LOW_TAG_PENALTY: f64 = 0.3;
const EDITOR_PENALTY: f64 = 0.1;
const MAX_SCORE: f64 = 0.4;
/// Video metadata comes from ffprobe; the bytes are only sniffed.
const VIDEO_SNIFF_BYTES: u64 = 64 * 1024;

/// Editing tools, matched case-insensitively against the software signature.
const KNOWN_EDITORS: &[(&str, &str)] = &[
    ("photoshop", "Photoshop"),
    ("gimp", "GIMP"),
    ("lightroom", "Lightroom"),
    ("affinity", "Affinity"),
    ("pixelmator", "Pixelmator"),
    ("paint.net", "Paint.NET"),
    ("snapseed", "Snapseed"),
    ("premiere", "Premiere"),
    ("final cut", "Final Cut"),
    ("davinci resolve", "DaVinci Resolve"),
    ("capcut", "CapCut"),
];

/// Tags, software signature and manifest, independent of container type.
struct Inspection {
    mime_type: &'static str,
    tag_count: usize,
    software: Option<String>,
    manifest: Option<Vec<u8>>,
}

pub struct MetadataLayer {
    verifier: Arc<dyn ProvenanceVerifier>,
    video: VideoTools,
}

impl Default for MetadataLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataLayer {
    pub fn new() -> Self {
        Self {
            verifier: Arc::new(ManifestProbe),
            video: VideoTools::default(),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ProvenanceVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_video_tools(mut self, tools: VideoTools) -> Self {
        self.video = tools;
        self
    }

    /// Analyse a path directly. Missing and empty files produce a zero score
    /// with an anomaly instead of an error.
    pub fn analyze_path(&self, path: &Path, kind: MediaKind) -> LayerResult {
        let mut result = LayerResult::neutral(0.0);

        let data = match read_input(path, kind) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                result.flag("File not found");
                return result;
            }
            Err(e) => {
                log::warn!("metadata: cannot read {}: {}", path.display(), e);
                result.flag("File could not be read");
                return result.with_error(e);
            }
        };
        if data.is_empty() {
            result.flag("Empty file");
            return result;
        }

        let inspection = match kind {
            MediaKind::Image => inspect_image(&data),
            MediaKind::Video => self.inspect_video(path, &data),
        };

        result.detail("mime_type", inspection.mime_type);
        result.detail("tag_count", inspection.tag_count);
        result.detail("software", inspection.software.clone().unwrap_or_default());

        if inspection.tag_count < MIN_TAG_COUNT {
            result.flag("Very low metadata count (typical of AI-generated or stripped files)");
            result.add_score(LOW_TAG_PENALTY);
        }

        let software = inspection.software.as_deref().unwrap_or("").trim();
        if software.is_empty() {
            result.flag("No software signature found");
        } else if let Some(editor) = known_editor(software) {
            result.flag(format!("Edited with {}", editor));
            result.add_score(EDITOR_PENALTY);
        }

        let provenance = self.verifier.verify(inspection.manifest.as_deref());
        if provenance.verified {
            result.set_score(0.0);
        }
        result.detail("provenance_verified", provenance.verified);
        result.detail(
            "provenance",
            serde_json::to_value(&provenance).unwrap_or(serde_json::Value::Null),
        );

        result.set_score(result.score().min(MAX_SCORE));
        result
    }

    fn inspect_video(&self, path: &Path, data: &[u8]) -> Inspection {
        let format = ContainerFormat::sniff(data);
        let tags = match self.video.probe_tags(path) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("metadata: ffprobe failed for {}: {}", path.display(), e);
                Default::default()
            }
        };
        let software = tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("encoder"))
            .map(|(_, v)| v.clone());

        Inspection {
            mime_type: format.mime_type(),
            tag_count: tags.len(),
            software,
            manifest: None,
        }
    }
}

/// Whole file for images, a bounded prefix for videos.
fn read_input(path: &Path, kind: MediaKind) -> io::Result<Vec<u8>> {
    match kind {
        MediaKind::Image => std::fs::read(path),
        MediaKind::Video => {
            let mut data = Vec::new();
            File::open(path)?.take(VIDEO_SNIFF_BYTES).read_to_end(&mut data)?;
            Ok(data)
        }
    }
}

fn inspect_image(data: &[u8]) -> Inspection {
    let info = container::inspect(data);
    Inspection {
        mime_type: info.format.mime_type(),
        tag_count: info.tag_count,
        software: info.software,
        manifest: info.manifest,
    }
}

/// Display name of the editor named in a software signature, if any.
pub fn known_editor(software: &str) -> Option<&'static str> {
    let lower = software.to_lowercase();
    KNOWN_EDITORS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, name)| *name)
}

impl ForensicLayer for MetadataLayer {
    fn id(&self) -> LayerId {
        LayerId::Metadata
    }

    fn analyze(&self, input: &LayerInput<'_>) -> LayerResult {
        let result = self.analyze_path(input.sample.path(), input.sample.kind());
        log::debug!(
            "metadata: score={:.3} anomalies={}",
            result.score(),
            result.anomalies.len()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::exif::build_tiff;
    use crate::container::jpeg::segment;
    use crate::provenance::ProvenanceReport;

    struct AlwaysVerified;

    impl ProvenanceVerifier for AlwaysVerified {
        fn verify(&self, _manifest: Option<&[u8]>) -> ProvenanceReport {
            ProvenanceReport {
                verified: true,
                manifest_present: true,
                issuer: Some("Test CA".to_string()),
                ..ProvenanceReport::default()
            }
        }
    }

    fn jpeg_with_exif(entries: &[(u16, &str)], software: Option<&str>) -> Vec<u8> {
        let mut app1 = b"Exif\0\0".to_vec();
        app1.extend(build_tiff(entries, software));
        let mut data = vec![0xFF, 0xD8];
        data.extend(segment(0xE1, &app1));
        data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0xFF, 0xD9]);
        data
    }

    fn write(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    const CAMERA_TAGS: &[(u16, &str)] = &[
        (0x010F, "Canon"),
        (0x0110, "EOS R5"),
        (0x0132, "2024:01:01 10:00:00"),
        (0x013B, "Jane Doe"),
        (0x8298, "(c) Jane"),
        (0x010E, "Harbour at dawn"),
    ];

    // ==========================================================================
    // MISSING INPUT
    // ==========================================================================

    #[test]
    fn test_missing_file() {
        let layer = MetadataLayer::new();
        let result = layer.analyze_path(Path::new("/no/such/file.jpg"), MediaKind::Image);
        assert_eq!(result.score(), 0.0);
        assert_eq!(result.anomalies, vec!["File not found"]);
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "empty.jpg", &[]);
        let result = MetadataLayer::new().analyze_path(&path, MediaKind::Image);
        assert_eq!(result.score(), 0.0);
        assert_eq!(result.anomalies, vec!["Empty file"]);
    }

    #[test]
    fn test_video_reads_only_a_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let mut movie = b"\0\0\0\x20ftypisom".to_vec();
        movie.resize(1024 * 1024, 0xAB);
        let path = write(&dir, "large.mp4", &movie);

        let data = read_input(&path, MediaKind::Video).unwrap();
        assert_eq!(data.len() as u64, VIDEO_SNIFF_BYTES);
        assert_eq!(read_input(&path, MediaKind::Image).unwrap().len(), movie.len());

        let layer = MetadataLayer::new().with_video_tools(VideoTools::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe"));
        let result = layer.analyze_path(&path, MediaKind::Video);
        assert_eq!(result.details["mime_type"], "video/mp4");
    }

    // ==========================================================================
    // SCORING
    // ==========================================================================

    #[test]
    fn test_stripped_file_scores_low_tag_penalty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bare.jpg", &jpeg_with_exif(&[], None));
        let result = MetadataLayer::new().analyze_path(&path, MediaKind::Image);

        assert!((result.score() - 0.3).abs() < 1e-9);
        assert_eq!(result.anomalies.len(), 2);
        assert!(result.anomalies[0].starts_with("Very low metadata count"));
        assert_eq!(result.anomalies[1], "No software signature found");
        assert_eq!(result.details["mime_type"], "image/jpeg");
        assert_eq!(result.details["provenance_verified"], false);
    }

    #[test]
    fn test_camera_file_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "camera.jpg", &jpeg_with_exif(CAMERA_TAGS, Some("Firmware 1.2")));
        let result = MetadataLayer::new().analyze_path(&path, MediaKind::Image);

        assert_eq!(result.score(), 0.0);
        assert!(result.anomalies.is_empty());
        assert_eq!(result.details["tag_count"], 7);
    }

    #[test]
    fn test_known_editor_adds_penalty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "edited.jpg", &jpeg_with_exif(CAMERA_TAGS, Some("Adobe Photoshop 25.0")));
        let result = MetadataLayer::new().analyze_path(&path, MediaKind::Image);

        assert!((result.score() - 0.1).abs() < 1e-9);
        assert_eq!(result.anomalies, vec!["Edited with Photoshop"]);
    }

    #[test]
    fn test_score_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "gimp.jpg", &jpeg_with_exif(&[], Some("GIMP 2.10")));
        let result = MetadataLayer::new().analyze_path(&path, MediaKind::Image);
        assert!((result.score() - 0.4).abs() < 1e-9);
        assert!(result.score() <= MAX_SCORE);
    }

    #[test]
    fn test_verified_manifest_resets_score() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "signed.jpg", &jpeg_with_exif(&[], Some("GIMP 2.10")));
        let layer = MetadataLayer::new().with_verifier(Arc::new(AlwaysVerified));
        let result = layer.analyze_path(&path, MediaKind::Image);

        assert_eq!(result.score(), 0.0);
        // The anomalies are still reported, only the score is overridden
        assert_eq!(result.anomalies.len(), 2);
        assert_eq!(result.details["provenance_verified"], true);
        assert_eq!(result.details["provenance"]["issuer"], "Test CA");
    }

    #[test]
    fn test_unverified_manifest_reported() {
        let mut data = jpeg_with_exif(CAMERA_TAGS, None);
        let tail = data.split_off(data.len() - 6);
        data.extend(segment(0xEB, b"JP\0\x01jumbc2pa"));
        data.extend(tail);

        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "claimed.jpg", &data);
        let result = MetadataLayer::new().analyze_path(&path, MediaKind::Image);

        assert_eq!(result.details["provenance"]["manifest_present"], true);
        assert_eq!(
            result.details["provenance"]["error"],
            "signature verification backend unavailable"
        );
    }

    #[test]
    fn test_known_editor_matching() {
        assert_eq!(known_editor("Adobe Photoshop Lightroom Classic"), Some("Photoshop"));
        assert_eq!(known_editor("DaVinci Resolve 18"), Some("DaVinci Resolve"));
        assert_eq!(known_editor("capcut"), Some("CapCut"));
        assert_eq!(known_editor("Lavf60.3.100"), None);
    }
}
