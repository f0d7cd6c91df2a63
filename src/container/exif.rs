//! EXIF / TIFF structure parsing
//!
//! EXIF data is a small TIFF file: a byte-order mark, a pointer to the first
//! image file directory (IFD), and chains of 12-byte entries.
//!
//! ```text
//! offset 0   "II" or "MM"     byte order (Intel little / Motorola big)
//! offset 2   0x002A           magic
//! offset 4   u32              offset of IFD0
//!
//! IFD:  u16 count, then count x [tag u16][type u16][count u32][value/offset u32],
//!       then u32 offset of the next IFD (0 = end)
//! ```
//!
//! We only need two things from it: how many tags exist at all (stripped or
//! generated files carry almost none) and the Software tag (0x0131).

use std::collections::HashSet;

const TAG_SOFTWARE: u16 = 0x0131;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_INTEROP_IFD: u16 = 0xA005;
const TYPE_ASCII: u16 = 2;
const MAX_IFDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

/// Summary of one EXIF block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifSummary {
    /// Total entries across every IFD that was reached.
    pub tag_count: usize,
    pub software: Option<String>,
    /// Distinct tag ids seen, for diagnostics.
    pub tags: Vec<u16>,
}

struct Reader<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Reader<'a> {
    fn u16_at(&self, offset: usize) -> Option<u16> {
        let b = self.data.get(offset..offset + 2)?;
        Some(match self.order {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        })
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let b = self.data.get(offset..offset + 4)?;
        Some(match self.order {
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }
}

/// Parse a TIFF-structured EXIF payload (without the `Exif\0\0` prefix).
pub fn parse_tiff(data: &[u8]) -> Option<ExifSummary> {
    let order = match data.get(0..2)? {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return None,
    };
    let reader = Reader { data, order };
    if reader.u16_at(2)? != 0x002A {
        return None;
    }

    let mut summary = ExifSummary::default();
    let mut seen_tags = HashSet::new();
    let mut visited = HashSet::new();
    let mut pending = vec![reader.u32_at(4)? as usize];

    while let Some(offset) = pending.pop() {
        if offset == 0 || visited.len() >= MAX_IFDS || !visited.insert(offset) {
            continue;
        }
        let Some(count) = reader.u16_at(offset) else {
            continue;
        };

        for i in 0..count as usize {
            let entry = offset + 2 + i * 12;
            let (Some(tag), Some(kind), Some(n), Some(value)) = (
                reader.u16_at(entry),
                reader.u16_at(entry + 2),
                reader.u32_at(entry + 4),
                reader.u32_at(entry + 8),
            ) else {
                break;
            };

            summary.tag_count += 1;
            if seen_tags.insert(tag) {
                summary.tags.push(tag);
            }

            match tag {
                TAG_EXIF_IFD | TAG_GPS_IFD | TAG_INTEROP_IFD => pending.push(value as usize),
                TAG_SOFTWARE if kind == TYPE_ASCII => {
                    summary.software = read_ascii(&reader, entry + 8, n as usize, value as usize);
                }
                _ => {}
            }
        }

        // Next IFD in the chain (IFD0 -> IFD1 thumbnail)
        if let Some(next) = reader.u32_at(offset + 2 + count as usize * 12) {
            pending.push(next as usize);
        }
    }

    Some(summary)
}

fn read_ascii(reader: &Reader<'_>, inline_at: usize, len: usize, offset: usize) -> Option<String> {
    let bytes = if len <= 4 {
        reader.data.get(inline_at..inline_at + len)?
    } else {
        reader.data.get(offset..offset + len)?
    };
    let text: String = bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect();
    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Build a minimal little-endian TIFF block. Test helper shared with the
/// container parsers.
#[cfg(test)]
pub(crate) fn build_tiff(entries: &[(u16, &str)], software: Option<&str>) -> Vec<u8> {
    let mut all: Vec<(u16, u16, Vec<u8>)> = entries
        .iter()
        .map(|(tag, v)| (*tag, TYPE_ASCII, format!("{}\0", v).into_bytes()))
        .collect();
    if let Some(sw) = software {
        all.push((TAG_SOFTWARE, TYPE_ASCII, format!("{}\0", sw).into_bytes()));
    }

    let ifd_offset = 8usize;
    let data_offset = ifd_offset + 2 + all.len() * 12 + 4;
    let mut out = b"II".to_vec();
    out.extend_from_slice(&0x002Au16.to_le_bytes());
    out.extend_from_slice(&(ifd_offset as u32).to_le_bytes());
    out.extend_from_slice(&(all.len() as u16).to_le_bytes());

    let mut blob = Vec::new();
    for (tag, kind, value) in &all {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        if value.len() <= 4 {
            let mut inline = value.clone();
            inline.resize(4, 0);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&((data_offset + blob.len()) as u32).to_le_bytes());
            blob.extend_from_slice(value);
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&blob);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_counts_tags() {
        let tiff = build_tiff(&[(0x010F, "Canon"), (0x0110, "EOS R5")], None);
        let summary = parse_tiff(&tiff).unwrap();
        assert_eq!(summary.tag_count, 2);
        assert_eq!(summary.software, None);
        assert_eq!(summary.tags, vec![0x010F, 0x0110]);
    }

    #[test]
    fn test_parse_software_out_of_line() {
        let tiff = build_tiff(&[(0x010F, "Canon")], Some("Adobe Photoshop 25.0"));
        let summary = parse_tiff(&tiff).unwrap();
        assert_eq!(summary.tag_count, 2);
        assert_eq!(summary.software.as_deref(), Some("Adobe Photoshop 25.0"));
    }

    #[test]
    fn test_parse_software_inline() {
        // 3 chars + NUL fits in the 4-byte value field
        let tiff = build_tiff(&[], Some("GIM"));
        assert_eq!(parse_tiff(&tiff).unwrap().software.as_deref(), Some("GIM"));
    }

    #[test]
    fn test_rejects_bad_byte_order() {
        assert!(parse_tiff(b"XX\x2a\x00\x08\x00\x00\x00").is_none());
    }

    #[test]
    fn test_rejects_bad_magic() {
        assert!(parse_tiff(b"II\x2b\x00\x08\x00\x00\x00").is_none());
    }

    #[test]
    fn test_truncated_ifd_does_not_panic() {
        let mut tiff = build_tiff(&[(0x010F, "Canon"), (0x0110, "EOS")], None);
        tiff.truncate(16);
        let summary = parse_tiff(&tiff).unwrap();
        assert!(summary.tag_count <= 1);
    }

    #[test]
    fn test_self_referencing_ifd_terminates() {
        // IFD0 with zero entries whose next pointer points back at itself
        let mut tiff = b"II\x2a\x00\x08\x00\x00\x00".to_vec();
        tiff.extend_from_slice(&0u16.to_le_bytes());
        tiff.extend_from_slice(&8u32.to_le_bytes());
        let summary = parse_tiff(&tiff).unwrap();
        assert_eq!(summary.tag_count, 0);
    }
}
