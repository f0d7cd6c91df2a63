//! Media access: kind detection, image decoding and video frames
//!
//! Images are decoded with the `image` crate. Videos are read by shelling
//! out to the system `ffmpeg`/`ffprobe` binaries, which stream raw `rgb24`
//! frames over a pipe. Nothing is written to disk: the representative frame
//! and every sampled frame live only in memory, and the child process is
//! killed and reaped when the frame stream is dropped.

use crate::error::{Error, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "m4v"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input to the pipeline. The caller owns the file; the core never deletes it.
#[derive(Debug, Clone)]
pub struct MediaSample {
    path: PathBuf,
    kind: MediaKind,
    len: u64,
}

impl MediaSample {
    /// Resolve a path into a sample, rejecting missing, empty and
    /// unsupported inputs.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let kind = MediaKind::from_path(path).ok_or_else(|| {
            Error::Unsupported(
                path.extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_else(|| "no extension".to_string()),
            )
        })?;

        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        if meta.len() == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "empty file",
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            len: meta.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Decode an image file into RGB, sniffing the format from content.
pub fn decode_image(path: &Path) -> Result<RgbImage> {
    let img = image::io::Reader::open(path)?
        .with_guessed_format()?
        .decode()?;
    Ok(img.to_rgb8())
}

#[derive(Deserialize)]
struct ProbeStreams {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    format: Option<ProbeFormatTags>,
}

#[derive(Deserialize)]
struct ProbeFormatTags {
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Wrapper around the `ffmpeg` / `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct VideoTools {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for VideoTools {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl VideoTools {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// True when `ffmpeg -version` runs successfully.
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn run_probe(&self, path: &Path, entries: &str) -> Result<Vec<u8>> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-select_streams", "v:0", "-show_entries", entries, "-of", "json"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::tool("ffprobe", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::tool("ffprobe", stderr.trim().to_string()));
        }
        Ok(output.stdout)
    }

    /// Width and height of the first video stream.
    pub fn probe_dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        let raw = self.run_probe(path, "stream=width,height")?;
        let parsed: ProbeStreams = serde_json::from_slice(&raw)?;
        parsed
            .streams
            .iter()
            .find_map(|s| match (s.width, s.height) {
                (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
                _ => None,
            })
            .ok_or_else(|| Error::tool("ffprobe", "no video stream"))
    }

    /// Container-level metadata tags (encoder, creation_time, ...).
    pub fn probe_tags(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let raw = self.run_probe(path, "format_tags")?;
        let parsed: ProbeFormat = serde_json::from_slice(&raw)?;
        Ok(parsed.format.map(|f| f.tags).unwrap_or_default())
    }

    /// Stream up to `max_frames` decoded frames.
    ///
    /// Frames keep the coded orientation. ffprobe reports the coded size, so
    /// display-matrix rotation must not be applied or 90° clips come out
    /// transposed against `width`/`height`.
    pub fn frames(&self, path: &Path, max_frames: usize) -> Result<VideoFrames> {
        let (width, height) = self.probe_dimensions(path)?;

        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args(["-an", "-sn", "-frames:v"])
            .arg(max_frames.to_string())
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::tool("ffmpeg", e.to_string()))?;

        let stdout = match child.stdout.take() {
            Some(s) => s,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::tool("ffmpeg", "stdout not captured"));
            }
        };

        Ok(VideoFrames {
            child,
            stdout,
            width,
            height,
            remaining: max_frames,
        })
    }

    /// The first decodable frame of a video.
    pub fn first_frame(&self, path: &Path) -> Result<RgbImage> {
        let mut frames = self.frames(path, 1)?;
        frames
            .next()
            .ok_or_else(|| Error::tool("ffmpeg", "no decodable frame"))
    }
}

/// Streaming iterator over raw video frames.
pub struct VideoFrames {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    remaining: usize,
}

impl VideoFrames {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Iterator for VideoFrames {
    type Item = RgbImage;

    fn next(&mut self) -> Option<RgbImage> {
        if self.remaining == 0 {
            return None;
        }
        let frame_len = self.width as usize * self.height as usize * 3;
        let mut buf = vec![0u8; frame_len];
        if self.stdout.read_exact(&mut buf).is_err() {
            self.remaining = 0;
            return None;
        }
        self.remaining -= 1;
        RgbImage::from_raw(self.width, self.height, buf)
    }
}

impl Drop for VideoFrames {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Decode the frame every image-oriented layer analyses.
pub fn representative_frame(sample: &MediaSample, tools: &VideoTools) -> Result<RgbImage> {
    match sample.kind() {
        MediaKind::Image => decode_image(sample.path()),
        MediaKind::Video => tools.first_frame(sample.path()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(MediaKind::from_extension("JPG"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_extension(".png"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_extension("mp4"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_extension("MKV"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_extension("txt"), None);
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(MediaKind::from_path(Path::new("/a/b/clip.mov")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("photo")), None);
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MediaKind::Video).unwrap(), "\"video\"");
    }

    #[test]
    fn test_open_missing_file() {
        let err = MediaSample::open("/definitely/not/here.jpg").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_open_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        std::fs::File::create(&path).unwrap();
        let err = MediaSample::open(&path).unwrap_err();
        assert!(err.to_string().contains("empty file"));
    }

    #[test]
    fn test_open_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hello").unwrap();
        assert!(matches!(MediaSample::open(&path), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_open_valid_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30])).save(&path).unwrap();

        let sample = MediaSample::open(&path).unwrap();
        assert_eq!(sample.kind(), MediaKind::Image);
        assert!(sample.len() > 0);
        assert_eq!(sample.file_name(), "tiny.png");

        let frame = decode_image(sample.path()).unwrap();
        assert_eq!(frame.dimensions(), (4, 4));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.jpg");
        std::fs::write(&path, b"this is not an image at all").unwrap();
        assert!(decode_image(&path).is_err());
    }

    #[test]
    fn test_missing_ffmpeg_binary_is_an_error() {
        let tools = VideoTools::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        assert!(!tools.is_available());
        assert!(tools.first_frame(Path::new("clip.mp4")).is_err());
    }
}
