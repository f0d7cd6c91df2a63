//! File-format metadata extraction
//!
//! Reads the bytes of a media file and pulls out the three things the
//! metadata layer cares about: how much embedded technical metadata exists,
//! which software last wrote the file, and whether a content-provenance
//! manifest is embedded.
//!
//! | Format | Tags from                         | Software          | Manifest |
//! |--------|-----------------------------------|-------------------|----------|
//! | JPEG   | APP1 EXIF (all IFDs)              | EXIF 0x0131       | APP11    |
//! | PNG    | text chunks + `eXIf`              | `Software` / EXIF | `caBX`   |
//! | WebP   | `EXIF` RIFF chunk                 | EXIF 0x0131       | -        |
//! | TIFF   | the file itself                   | 0x0131            | -        |
//!
//! Video containers are handled by `ffprobe` in the metadata layer.

pub mod exif;
pub mod jpeg;
pub mod png;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Mp4,
    Avi,
    Matroska,
    Unknown,
}

impl ContainerFormat {
    /// Identify the container from its leading magic bytes.
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            ContainerFormat::Jpeg
        } else if data.starts_with(png::SIGNATURE) {
            ContainerFormat::Png
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            ContainerFormat::Gif
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            ContainerFormat::Webp
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"AVI " {
            ContainerFormat::Avi
        } else if data.starts_with(b"BM") {
            ContainerFormat::Bmp
        } else if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
            ContainerFormat::Tiff
        } else if data.len() >= 8 && &data[4..8] == b"ftyp" {
            ContainerFormat::Mp4
        } else if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
            ContainerFormat::Matroska
        } else {
            ContainerFormat::Unknown
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::Jpeg => "image/jpeg",
            ContainerFormat::Png => "image/png",
            ContainerFormat::Gif => "image/gif",
            ContainerFormat::Webp => "image/webp",
            ContainerFormat::Bmp => "image/bmp",
            ContainerFormat::Tiff => "image/tiff",
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::Avi => "video/x-msvideo",
            ContainerFormat::Matroska => "video/x-matroska",
            ContainerFormat::Unknown => "application/octet-stream",
        }
    }
}

/// What the metadata layer needs from a file's bytes.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub format: ContainerFormat,
    pub tag_count: usize,
    pub software: Option<String>,
    /// Raw provenance-manifest bytes, when one is embedded.
    pub manifest: Option<Vec<u8>>,
}

pub fn inspect(data: &[u8]) -> ContainerInfo {
    let format = ContainerFormat::sniff(data);
    let mut info = ContainerInfo {
        format,
        tag_count: 0,
        software: None,
        manifest: None,
    };

    match format {
        ContainerFormat::Jpeg => {
            if let Some(meta) = jpeg::scan(data) {
                if let Some(exif) = meta.exif {
                    info.tag_count = exif.tag_count;
                    info.software = exif.software;
                }
                info.manifest = meta.manifest;
            }
        }
        ContainerFormat::Png => {
            if let Some(meta) = png::scan(data) {
                info.tag_count = meta.tag_count();
                info.software = meta
                    .exif
                    .as_ref()
                    .and_then(|e| e.software.clone())
                    .or(meta.software);
                info.manifest = meta.manifest;
            }
        }
        ContainerFormat::Webp => {
            if let Some(exif) = webp_exif(data).and_then(exif::parse_tiff) {
                info.tag_count = exif.tag_count;
                info.software = exif.software;
            }
        }
        ContainerFormat::Tiff => {
            if let Some(exif) = exif::parse_tiff(data) {
                info.tag_count = exif.tag_count;
                info.software = exif.software;
            }
        }
        _ => {}
    }

    info
}

/// Payload of the `EXIF` chunk in a RIFF/WebP file.
fn webp_exif(data: &[u8]) -> Option<&[u8]> {
    let mut pos = 12;
    while pos + 8 <= data.len() {
        let fourcc = &data[pos..pos + 4];
        let len = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]) as usize;
        let start = pos + 8;
        let end = start.checked_add(len).filter(|&e| e <= data.len())?;
        if fourcc == b"EXIF" {
            let body = &data[start..end];
            return Some(body.strip_prefix(b"Exif\0\0").unwrap_or(body));
        }
        // Chunks are padded to even length
        pos = end + (len & 1);
    }
    None
}
