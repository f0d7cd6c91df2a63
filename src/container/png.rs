//! PNG chunk walking
//!
//! After the 8-byte signature a PNG is a list of chunks:
//! `[length u32 BE][type 4 bytes][data][crc u32]`.
//!
//! Text chunks (`tEXt`, `zTXt`, `iTXt`) carry keyword/value metadata; the
//! keyword `Software` plays the role of the EXIF Software tag. `eXIf` holds
//! a raw TIFF block and `caBX` holds a content-provenance manifest.

use super::exif::{self, ExifSummary};

pub const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone, Default)]
pub struct PngMetadata {
    /// Keywords of all text chunks, in file order.
    pub text_keywords: Vec<String>,
    pub software: Option<String>,
    pub exif: Option<ExifSummary>,
    pub manifest: Option<Vec<u8>>,
}

impl PngMetadata {
    pub fn tag_count(&self) -> usize {
        self.text_keywords.len() + self.exif.as_ref().map(|e| e.tag_count).unwrap_or(0)
    }
}

pub fn scan(data: &[u8]) -> Option<PngMetadata> {
    if !data.starts_with(SIGNATURE) {
        return None;
    }

    let mut meta = PngMetadata::default();
    let mut pos = SIGNATURE.len();

    while pos + 8 <= data.len() {
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let kind = &data[pos + 4..pos + 8];
        let start = pos + 8;
        let Some(end) = start.checked_add(len).filter(|&e| e <= data.len()) else {
            break;
        };
        let body = &data[start..end];

        match kind {
            b"tEXt" => {
                let (keyword, value) = split_keyword(body);
                if keyword.eq_ignore_ascii_case("software") {
                    meta.software = Some(latin1(value)).filter(|s| !s.is_empty());
                }
                meta.text_keywords.push(keyword);
            }
            b"iTXt" => {
                let (keyword, rest) = split_keyword(body);
                // compression flag, method, language\0, translated keyword\0, text
                if keyword.eq_ignore_ascii_case("software") && rest.first() == Some(&0) {
                    let text = rest
                        .get(2..)
                        .and_then(|r| skip_nul_terminated(r, 2))
                        .map(|t| String::from_utf8_lossy(t).trim().to_string());
                    meta.software = text.filter(|s| !s.is_empty());
                }
                meta.text_keywords.push(keyword);
            }
            b"zTXt" => {
                let (keyword, _) = split_keyword(body);
                meta.text_keywords.push(keyword);
            }
            b"eXIf" => {
                meta.exif = exif::parse_tiff(body);
            }
            b"caBX" => {
                meta.manifest = Some(body.to_vec());
            }
            b"IEND" => break,
            _ => {}
        }

        // data + crc
        pos = end + 4;
    }

    Some(meta)
}

fn split_keyword(body: &[u8]) -> (String, &[u8]) {
    match body.iter().position(|&b| b == 0) {
        Some(i) => (latin1(&body[..i]), &body[i + 1..]),
        None => (latin1(body), &[]),
    }
}

fn skip_nul_terminated(data: &[u8], fields: usize) -> Option<&[u8]> {
    let mut rest = data;
    for _ in 0..fields {
        let i = rest.iter().position(|&b| b == 0)?;
        rest = &rest[i + 1..];
    }
    Some(rest)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect::<String>().trim().to_string()
}

#[cfg(test)]
pub(crate) fn chunk(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = (body.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    // CRC is not validated by the scanner
    out.extend_from_slice(&[0, 0, 0, 0]);
    out
}
