//! Index file management for navigation between daily reports.
//!
//! `index.md` gets one line per run, newest last, with the headline counts
//! so a reader can spot busy days without opening each report. Lines are
//! appended, so several runs on the same day each leave an entry.

use crate::detect::ReportDelta;
use chrono::NaiveDate;
use std::error::Error;
use std::fmt::Write;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

pub const INDEX_FILENAME: &str = "index.md";

/// The index line for one report.
pub fn index_line(
    date: NaiveDate,
    report_filename: &str,
    delta: &ReportDelta,
    failed: usize,
) -> String {
    let mut line = format!(
        "- [{}](./{}): {} added, {} changed, {} removed",
        date.format("%Y-%m-%d"),
        report_filename,
        delta.added_count(),
        delta.changed_count(),
        delta.removed_count()
    );
    if failed > 0 {
        let _ = write!(line, ", {failed} failed");
    }
    line
}

/// Append a report entry to `{report_dir}/index.md`, creating it with a
/// heading if it does not exist yet.
#[instrument(level = "info", skip_all, fields(%report_dir, %date, file = %report_filename))]
pub async fn update_report_index(
    report_dir: &str,
    date: NaiveDate,
    report_filename: &str,
    delta: &ReportDelta,
    failed: usize,
) -> Result<(), Box<dyn Error>> {
    let index_path = Path::new(report_dir).join(INDEX_FILENAME);
    let mut md = String::new();

    if !tokio::fs::try_exists(&index_path).await? {
        md.push_str("# Competitor Reports\n\n");
    }
    md.push_str(&index_line(date, report_filename, delta, failed));
    md.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&index_path)
        .await?;
    file.write_all(md.as_bytes()).await?;
    info!(path = %index_path.display(), "Updated report index");
    Ok(())
}
