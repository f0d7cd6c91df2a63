//! Report generation for analysis results
//!
//! Output formatters for batches of [`AggregateReport`]s:
//!
//! - **JSON**: Machine-readable format, every layer's details included
//! - **CSV**: Spreadsheet-compatible, one row per file with the layer scores
//!
//! # Usage
//!
//! ```ignore
//! use fakescope::report;
//!
//! // Automatically picks format based on extension
//! report::generate("report.json", &reports)?;  // JSON
//! report::generate("report.csv", &reports)?;   // CSV
//! ```

pub mod csv;
pub mod json;

use crate::analyzer::{AggregateReport, Verdict};
use serde::Serialize;
use std::io;
use std::path::Path;

/// Generate a report in the appropriate format based on file extension
pub fn generate<P: AsRef<Path>>(path: P, reports: &[AggregateReport]) -> io::Result<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mut file = std::fs::File::create(path)?;

    match ext.as_str() {
        "json" => json::write(&mut file, reports),
        _ => csv::write(&mut file, reports),
    }
}

/// Summary statistics for a batch of reports
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub real: usize,
    pub suspicious: usize,
    pub ai_generated: usize,
    /// Inputs that never reached the layers (counted under `real` as well).
    pub unreadable: usize,
}

impl Summary {
    pub fn from_reports(reports: &[AggregateReport]) -> Self {
        let mut summary = Self::default();
        summary.total = reports.len();

        for r in reports {
            match r.verdict {
                Verdict::Real => summary.real += 1,
                Verdict::Suspicious => summary.suspicious += 1,
                Verdict::AIGenerated => summary.ai_generated += 1,
            }
            if r.is_unreadable() {
                summary.unreadable += 1;
            }
        }

        summary
    }
}
