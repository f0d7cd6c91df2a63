//! CSV report: one row per file
//!
//! Layer columns are empty when the layer did not run for that file (physics
//! for videos, every layer for unreadable input).

use crate::analyzer::{AggregateReport, LayerId};
use std::io::{self, Write};

const LAYER_COLUMNS: [LayerId; 6] = [
    LayerId::Metadata,
    LayerId::Biology,
    LayerId::Math,
    LayerId::Model,
    LayerId::Physics,
    LayerId::EarlySignature,
];

pub fn write<W: Write>(out: &mut W, reports: &[AggregateReport]) -> io::Result<()> {
    let mut header = vec!["file_path", "file_name", "media_type", "verdict", "confidence"];
    header.extend(LAYER_COLUMNS.iter().map(|id| id.score_key()));
    header.extend(["is_verified", "ela_image", "explanation", "error"]);
    writeln!(out, "{}", header.join(","))?;

    for r in reports {
        let mut row = vec![
            escape(&r.file_path),
            escape(&r.file_name),
            r.media_type.map(|k| k.to_string()).unwrap_or_default(),
            r.verdict.to_string(),
            format!("{:.3}", r.confidence),
        ];
        for id in LAYER_COLUMNS {
            row.push(
                r.layer_scores
                    .get(id.score_key())
                    .map(|s| format!("{:.3}", s))
                    .unwrap_or_default(),
            );
        }
        row.push(r.is_verified.to_string());
        row.push(escape(r.auxiliary_image_ref.as_deref().unwrap_or("")));
        row.push(escape(&r.explanation));
        row.push(escape(r.error().unwrap_or("")));
        writeln!(out, "{}", row.join(","))?;
    }

    Ok(())
}

/// Quote a field if it contains a separator, quote or line break.
fn escape(field: &str) -> String {
    if field.contains(|c| c == ',' || c == '"' || c == '\n' || c == '\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Verdict;
    use crate::media::MediaKind;
    use crate::report::tests::create_test_report;
    use std::path::Path;

    fn render(reports: &[AggregateReport]) -> String {
        let mut buf = Vec::new();
        write(&mut buf, reports).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_header() {
        let text = render(&[]);
        assert_eq!(
            text.trim_end(),
            "file_path,file_name,media_type,verdict,confidence,metadata,biology_rppg,\
             math_forensics,ai_model,physics,early_signature,is_verified,ela_image,explanation,error"
        );
    }

    #[test]
    fn test_row_values_and_missing_layers() {
        let text = render(&[create_test_report("/x/a.png", Verdict::Suspicious, 0.5)]);
        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with("/x/a.png,a.png,image,Suspicious,0.500,0.300,,0.500,,,,false,,"));
    }

    #[test]
    fn test_unreadable_row_carries_error() {
        let r = AggregateReport::unreadable(Path::new("bad.jpg"), Some(MediaKind::Image), "empty file");
        let text = render(&[r]);
        let row = text.lines().nth(1).unwrap();
        assert!(row.ends_with(",empty file"));
        assert!(row.contains(",Real,0.000,"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
