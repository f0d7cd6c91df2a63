//! Content-provenance manifests
//!
//! A provenance manifest is a signed record of where a file came from and
//! how it was edited. Detecting that one is embedded is easy (the container
//! parsers hand us the raw bytes); proving the signature is not, and needs a
//! trust-list backed verifier. [`ProvenanceVerifier`] is the seam for that.
//!
//! The shipped [`ManifestProbe`] pulls the human-readable fields out of the
//! manifest JSON when it can find them, but always reports `verified = false`.

use serde::Serialize;

/// Result of a provenance check. Serialized into `AggregateReport::provenance`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProvenanceReport {
    pub verified: bool,
    pub manifest_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProvenanceReport {
    pub fn absent() -> Self {
        Self {
            error: Some("no provenance manifest found".to_string()),
            ..Self::default()
        }
    }
}

pub trait ProvenanceVerifier: Send + Sync {
    /// Check the raw manifest bytes found in a container, if any.
    fn verify(&self, manifest: Option<&[u8]>) -> ProvenanceReport;
}

/// Detects manifests and reads their claim fields without checking signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestProbe;

impl ProvenanceVerifier for ManifestProbe {
    fn verify(&self, manifest: Option<&[u8]>) -> ProvenanceReport {
        let Some(bytes) = manifest.filter(|b| !b.is_empty()) else {
            return ProvenanceReport::absent();
        };

        ProvenanceReport {
            verified: false,
            manifest_present: true,
            issuer: json_string_field(bytes, "issuer"),
            title: json_string_field(bytes, "title").or_else(|| json_string_field(bytes, "dc:title")),
            signature_date: json_string_field(bytes, "time"),
            error: Some("signature verification backend unavailable".to_string()),
        }
    }
}

/// Find `"key": "value"` anywhere in a byte blob. Claims are JSON (or CBOR
/// with JSON-looking text) embedded in binary boxes, so a full parse is not
/// possible without the box structure.
fn json_string_field(data: &[u8], key: &str) -> Option<String> {
    let needle = format!("\"{}\"", key);
    let needle = needle.as_bytes();
    let start = data.windows(needle.len()).position(|w| w == needle)? + needle.len();

    let mut rest = data[start..].iter().skip_while(|b| b.is_ascii_whitespace());
    if rest.next() != Some(&b':') {
        return None;
    }
    let mut rest = rest.skip_while(|b| b.is_ascii_whitespace());
    if rest.next() != Some(&b'"') {
        return None;
    }

    let mut out = Vec::new();
    let mut escaped = false;
    for &b in rest {
        match b {
            b'\\' if !escaped => escaped = true,
            b'"' if !escaped => {
                let value = String::from_utf8_lossy(&out).trim().to_string();
                return Some(value).filter(|v| !v.is_empty());
            }
            _ => {
                escaped = false;
                out.push(b);
            }
        }
        if out.len() > 256 {
            break;
        }
    }
    None
}
