//! End-to-end runs of the full pipeline on synthetic media.

use fakescope::media::VideoTools;
use fakescope::{MediaKind, Orchestrator, Verdict};
use image::{Rgb, RgbImage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

fn noisy_photo(size: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(size, size, |x, y| {
        let base = ((x + y) * 2 % 200) as i32;
        let n: i32 = rng.gen_range(-20..=20);
        let v = (base + n).clamp(0, 255) as u8;
        Rgb([v, v.saturating_add(10), v.saturating_sub(10)])
    })
}

fn save_image(dir: &Path, name: &str, img: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

/// Render a short test clip with ffmpeg, or `None` when ffmpeg is missing.
fn render_clip(dir: &Path) -> Option<PathBuf> {
    render_clip_with(dir, "clip.mp4", "96x96", &[])
}

fn render_clip_with(dir: &Path, name: &str, size: &str, extra: &[&str]) -> Option<PathBuf> {
    if !VideoTools::default().is_available() {
        eprintln!("ffmpeg not available, skipping");
        return None;
    }
    let out = dir.join(name);
    let source = format!("testsrc=size={}:rate=10", size);
    let status = Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-f", "lavfi", "-i", &source, "-t", "2"])
        .args(["-pix_fmt", "yuv420p"])
        .args(extra)
        .arg(&out)
        .stdin(Stdio::null())
        .status()
        .ok()?;
    if status.success() && out.exists() {
        Some(out)
    } else {
        eprintln!("ffmpeg could not render a test clip, skipping");
        None
    }
}

#[test]
fn image_report_has_full_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = save_image(dir.path(), "photo.jpg", &noisy_photo(128, 1));

    let report = Orchestrator::new().analyze(&path);
    assert_eq!(report.media_type, Some(MediaKind::Image));
    assert_eq!(report.layer_scores.len(), 6);
    assert!(report.layer_scores.values().all(|s| (0.0..=1.0).contains(s)));
    assert_eq!(report.verdict, Verdict::from_confidence(report.confidence));
    assert!(!report.explanation.is_empty());

    let json = serde_json::to_value(&report).unwrap();
    for key in [
        "verdict",
        "confidence",
        "layer_scores",
        "explanation",
        "details",
        "is_verified",
        "provenance",
        "auxiliary_image_ref",
    ] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(json["details"]["model"]["method"], "statistical");
    assert_eq!(json["details"]["physics"]["eye_glint_consistency"], "not checked");
    let aux = PathBuf::from(report.auxiliary_image_ref.clone().unwrap());
    assert_eq!(aux.parent(), Some(dir.path()));
    assert!(aux.exists());
}

#[test]
fn placeholder_checks_keep_math_floor() {
    // CFA placeholder (0.8) always clears its threshold
    let dir = tempfile::tempdir().unwrap();
    let path = save_image(dir.path(), "plain.png", &noisy_photo(64, 2));
    let report = Orchestrator::new().analyze(&path);
    assert!(report.layer_scores["math_forensics"] >= 0.5);
    assert!(report
        .explanation
        .contains("Missing CFA/Bayer pattern traces (direct RGB generation)"));
}

#[test]
fn orchestrator_is_shareable_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let ela_dir = dir.path().join("ela");
    std::fs::create_dir_all(&ela_dir).unwrap();
    let paths: Vec<PathBuf> = (0..4)
        .map(|i| save_image(dir.path(), &format!("img{}.png", i), &noisy_photo(64, i)))
        .collect();

    let orchestrator = Orchestrator::new().with_ela_dir(&ela_dir);
    let sequential: Vec<_> = paths.iter().map(|p| orchestrator.analyze(p).confidence).collect();

    let parallel: Vec<f64> = std::thread::scope(|s| {
        let handles: Vec<_> = paths
            .iter()
            .map(|p| {
                let o = &orchestrator;
                s.spawn(move || o.analyze(p).confidence)
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(sequential, parallel);
}

#[test]
fn undecodable_video_is_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.mp4");
    std::fs::write(&path, b"\0\0\0\x18ftypisomnot really a movie").unwrap();

    let report = Orchestrator::new().analyze(&path);
    assert_eq!(report.confidence, 0.0);
    assert_eq!(report.verdict, Verdict::Real);
    assert!(report.layer_scores.is_empty());
    assert_eq!(report.media_type, Some(MediaKind::Video));
    assert!(report.error().is_some());
}

#[test]
fn video_skips_image_only_layers() {
    let dir = tempfile::tempdir().unwrap();
    let clip = match render_clip(dir.path()) {
        Some(c) => c,
        None => return,
    };

    let report = Orchestrator::new().analyze(&clip);
    assert_eq!(report.media_type, Some(MediaKind::Video));
    assert!(!report.layer_scores.contains_key("physics"));
    assert!(!report.layer_scores.contains_key("ela"));
    assert!(report.layer_scores.contains_key("biology_rppg"));
    assert!(report.auxiliary_image_ref.is_none());
    assert!(report.details["biology"].contains_key("frames_sampled"));
    // No frame files were left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path() != clip)
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn rotated_clip_frames_keep_their_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let plain = match render_clip_with(dir.path(), "plain.mp4", "96x64", &[]) {
        Some(c) => c,
        None => return,
    };
    let rotated = match render_clip_with(dir.path(), "rotated.mp4", "96x64", &["-metadata:s:v", "rotate=90"]) {
        Some(c) => c,
        None => return,
    };

    let tools = VideoTools::default();
    let a = tools.first_frame(&plain).unwrap();
    let b = tools.first_frame(&rotated).unwrap();
    assert_eq!(a.dimensions(), (96, 64));
    assert_eq!(b.dimensions(), (96, 64));

    // Same source pixels, so a sheared decode would differ wildly
    let diff: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| x.abs_diff(*y) as u64)
        .sum();
    let mean = diff as f64 / a.as_raw().len() as f64;
    assert!(mean < 8.0, "mean difference {}", mean);
}
