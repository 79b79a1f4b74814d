use std::path::Path;

use log::info;

use crate::document::{display_field, Document};

/// Banner and summary lines around a sync.  Quiet mode drops these and
/// nothing else, progress and error lines are logged regardless.
#[derive(Debug, Clone, Copy, Default)]
pub struct Report {
    pub quiet: bool,
}

impl Report {
    pub fn new(quiet: bool) -> Report {
        Report { quiet }
    }

    pub fn banner_lines(&self) -> Vec<String> {
        if self.quiet {
            return vec![];
        }
        vec![
            "SDS Tokens Dashboard - BigQuery Sync".to_string(),
            "=".repeat(50),
        ]
    }

    pub fn summary_lines(&self, doc: &Document, path: &Path) -> Vec<String> {
        if self.quiet {
            return vec![];
        }
        vec![
            "Sync completed successfully!".to_string(),
            format!("File updated: {}", path.display()),
            format!("Records: {}", display_field(doc.record_count(), "0")),
            format!("Last updated: {}", display_field(doc.last_updated(), "Unknown")),
        ]
    }

    pub fn banner(&self) {
        for line in self.banner_lines() {
            info!("{}", line);
        }
    }

    pub fn summary(&self, doc: &Document, path: &Path) {
        for line in self.summary_lines(doc, path) {
            info!("{}", line);
        }
    }
}
