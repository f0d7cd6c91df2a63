//! JSON report: summary plus every report in full

use super::Summary;
use crate::analyzer::AggregateReport;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Serialize)]
struct JsonReport<'a> {
    generated: String,
    tool: &'static str,
    version: &'static str,
    summary: Summary,
    files: &'a [AggregateReport],
}

pub fn write<W: Write>(out: &mut W, reports: &[AggregateReport]) -> io::Result<()> {
    let report = JsonReport {
        generated: chrono::Local::now().to_rfc3339(),
        tool: "fakescope",
        version: env!("CARGO_PKG_VERSION"),
        summary: Summary::from_reports(reports),
        files: reports,
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Verdict;
    use crate::report::tests::create_test_report;

    #[test]
    fn test_json_includes_details_and_summary() {
        let reports = vec![
            create_test_report("a.png", Verdict::AIGenerated, 0.8),
            create_test_report("b.png", Verdict::Real, 0.1),
        ];
        let mut buf = Vec::new();
        write(&mut buf, &reports).unwrap();

        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["tool"], "fakescope");
        assert_eq!(v["summary"]["total"], 2);
        assert_eq!(v["summary"]["ai_generated"], 1);
        assert_eq!(v["files"][0]["verdict"], "AI-Generated");
        assert_eq!(v["files"][0]["layer_scores"]["math_forensics"], 0.8);
        assert_eq!(v["files"][1]["media_type"], "image");
    }

    #[test]
    fn test_empty_batch() {
        let mut buf = Vec::new();
        write(&mut buf, &[]).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["files"].as_array().unwrap().len(), 0);
    }
}
