//! JPEG segment walking
//!
//! A JPEG is a sequence of marker segments: `FF xx` followed by a big-endian
//! length that includes its own two bytes. Metadata lives before the scan
//! data (SOS, `FF DA`), so we stop there.
//!
//! - APP1 (`FF E1`) starting with `Exif\0\0` carries a TIFF block
//! - APP11 (`FF EB`) carries JUMBF boxes; a `c2pa` label marks a
//!   content-provenance manifest

use super::exif::{self, ExifSummary};

const MARKER_SOI: u8 = 0xD8;
const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;
const MARKER_APP1: u8 = 0xE1;
const MARKER_APP11: u8 = 0xEB;

#[derive(Debug, Clone, Default)]
pub struct JpegMetadata {
    pub exif: Option<ExifSummary>,
    /// Concatenated APP11 payloads that mention `c2pa`.
    pub manifest: Option<Vec<u8>>,
    pub segment_count: usize,
}

pub fn scan(data: &[u8]) -> Option<JpegMetadata> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != MARKER_SOI {
        return None;
    }

    let mut meta = JpegMetadata::default();
    let mut manifest: Vec<u8> = Vec::new();
    let mut pos = 2;

    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];
        // Fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == MARKER_SOS || marker == MARKER_EOI {
            break;
        }
        // Standalone markers without a length
        if (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            pos += 2;
            continue;
        }

        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if len < 2 {
            break;
        }
        let start = pos + 4;
        let end = (pos + 2 + len).min(data.len());
        let payload = &data[start..end];
        meta.segment_count += 1;

        match marker {
            MARKER_APP1 if payload.starts_with(b"Exif\0\0") && meta.exif.is_none() => {
                meta.exif = exif::parse_tiff(&payload[6..]);
            }
            MARKER_APP11 if contains(payload, b"c2pa") || (!manifest.is_empty() && payload.starts_with(b"JP")) => {
                manifest.extend_from_slice(payload);
            }
            _ => {}
        }

        pos += 2 + len;
    }

    if !manifest.is_empty() {
        meta.manifest = Some(manifest);
    }
    Some(meta)
}

pub(crate) fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
pub(crate) fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, marker];
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}
