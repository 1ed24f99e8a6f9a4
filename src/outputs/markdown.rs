//! Markdown rendering of a run's [`ReportDelta`] and failures.
//!
//! # Layout
//!
//! ```text
//! # Competitor Report: 2025-08-08
//! **Summary:** ...
//! ## Anthropic
//! ### Added / ### Changed / ### Removed
//! _N unchanged._
//! ## Could not update
//! | Company | Error | Details |
//! ```

use crate::detect::{CompanyDelta, ReportDelta};
use crate::models::Record;
use crate::run::Failure;
use crate::utils::truncate_text;
use chrono::NaiveDate;
use std::error::Error;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Snippets longer than this are shortened in the report.
const REPORT_SNIPPET_CHARS: usize = 200;

/// A report ready to be formatted with `to_string()`.
#[derive(Debug)]
pub struct Report<'a> {
    pub date: NaiveDate,
    pub delta: &'a ReportDelta,
    pub failures: &'a [Failure],
}

/// Render the daily report as markdown.
///
/// # Arguments
///
/// * `date` - Run date shown in the heading
/// * `delta` - Classification from [`classify`](crate::detect::classify)
/// * `failures` - Competitors that could not be updated, in config order
///
/// # Returns
///
/// The full report: summary line, one `## company` section per company in
/// the delta, and a "Could not update" table when `failures` is non-empty.
///
/// # Example
///
/// ```ignore
/// let md = render_report(date, &outcome.delta, &outcome.failures);
/// assert!(md.starts_with("# Competitor Report:"));
/// ```
pub fn render_report(date: NaiveDate, delta: &ReportDelta, failures: &[Failure]) -> String {
    Report {
        date,
        delta,
        failures,
    }
    .to_string()
}

/// Write a rendered report to `{report_dir}/{YYYY-MM-DD}.md`.
///
/// # Arguments
///
/// * `report_dir` - Existing directory that holds the daily reports
/// * `date` - Run date, used as the file name
/// * `report` - Markdown from [`render_report`]
///
/// # Returns
///
/// The report's file name (not the full path), for the index entry.
///
/// # Errors
///
/// Any I/O error; the caller treats it as a failed run.
#[instrument(level = "info", skip_all, fields(%report_dir, %date))]
pub async fn write_report(
    report_dir: &str,
    date: NaiveDate,
    report: &str,
) -> Result<String, Box<dyn Error>> {
    let filename = format!("{}.md", date.format("%Y-%m-%d"));
    let path = Path::new(report_dir).join(&filename);
    fs::write(&path, report).await?;
    info!(path = %path.display(), bytes = report.len(), "Wrote report");
    Ok(filename)
}

fn escape_link_text(s: &str) -> String {
    s.replace('[', "\\[").replace(']', "\\]")
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|")
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn write_title(f: &mut fmt::Formatter<'_>, record: &Record) -> fmt::Result {
    let title = escape_link_text(record.title());
    match record.url() {
        Some(url) => write!(f, "[{title}]({url})")?,
        None => write!(f, "**{title}**")?,
    }
    if let Some(date) = record.date() {
        write!(f, " ({date})")?;
    }
    Ok(())
}

fn write_record(f: &mut fmt::Formatter<'_>, record: &Record) -> fmt::Result {
    write!(f, "- ")?;
    write_title(f, record)?;
    if !record.snippet().is_empty() {
        write!(f, ": {}", truncate_text(record.snippet(), REPORT_SNIPPET_CHARS))?;
    }
    writeln!(f)
}

fn write_company(f: &mut fmt::Formatter<'_>, name: &str, delta: &CompanyDelta) -> fmt::Result {
    writeln!(f, "## {name}\n")?;

    if delta.is_quiet() {
        return writeln!(
            f,
            "No changes ({} unchanged).\n",
            delta.unchanged.len()
        );
    }

    if !delta.added.is_empty() {
        writeln!(f, "### Added\n")?;
        for record in &delta.added {
            write_record(f, record)?;
        }
        writeln!(f)?;
    }

    if !delta.changed.is_empty() {
        writeln!(f, "### Changed\n")?;
        for change in &delta.changed {
            write!(f, "- ")?;
            write_title(f, &change.current)?;
            writeln!(f)?;
            writeln!(
                f,
                "  - before: {}",
                truncate_text(change.previous.snippet(), REPORT_SNIPPET_CHARS)
            )?;
            writeln!(
                f,
                "  - after: {}",
                truncate_text(change.current.snippet(), REPORT_SNIPPET_CHARS)
            )?;
        }
        writeln!(f)?;
    }

    if !delta.removed.is_empty() {
        writeln!(f, "### Removed\n")?;
        for record in &delta.removed {
            write!(f, "- ")?;
            write_title(f, record)?;
            writeln!(f)?;
        }
        writeln!(f)?;
    }

    writeln!(f, "_{} unchanged._\n", delta.unchanged.len())
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Competitor Report: {}\n", self.date.format("%Y-%m-%d"))?;
        write!(
            f,
            "**Summary:** {} added, {} changed, {} removed, {} unchanged across {}.",
            self.delta.added_count(),
            self.delta.changed_count(),
            self.delta.removed_count(),
            self.delta.unchanged_count(),
            plural(self.delta.companies.len(), "company", "companies"),
        )?;
        if !self.failures.is_empty() {
            write!(
                f,
                " {} could not be updated.",
                plural(self.failures.len(), "company", "companies")
            )?;
        }
        writeln!(f, "\n")?;

        for (name, delta) in &self.delta.companies {
            write_company(f, name, delta)?;
        }

        if !self.failures.is_empty() {
            writeln!(f, "## Could not update\n")?;
            writeln!(f, "| Company | Error | Details |")?;
            writeln!(f, "|---|---|---|")?;
            for failure in self.failures {
                writeln!(
                    f,
                    "| {} | {} | {} |",
                    escape_cell(&failure.company),
                    failure.kind(),
                    escape_cell(&failure.error.to_string())
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::classify;
    use crate::errors::{FetchError, ParseError, ScrapeError};
    use crate::models::Snapshot;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 8).unwrap()
    }

    fn snapshot(entries: Vec<(&str, Vec<Record>)>) -> Snapshot {
        Snapshot::from_companies(
            None,
            entries.into_iter().map(|(n, r)| (n.to_string(), r)),
        )
    }

    #[test]
    fn test_report_sections() {
        let previous = snapshot(vec![(
            "OpenAI",
            vec![
                Record::new("OpenAI", "GPT-5 launch", None, None, "v1"),
                Record::new("OpenAI", "Old post", None, None, "bye"),
                Record::new("OpenAI", "Steady", None, None, "same"),
            ],
        )]);
        let current = snapshot(vec![
            (
                "OpenAI",
                vec![
                    Record::new(
                        "OpenAI",
                        "GPT-5 launch",
                        Some("https://openai.com/blog/gpt-5".into()),
                        Some("2025-08-07".into()),
                        "v2",
                    ),
                    Record::new("OpenAI", "Steady", None, None, "same"),
                    Record::new("OpenAI", "Fresh [beta]", None, None, "hello"),
                ],
            ),
            ("Anthropic", vec![]),
        ]);
        let delta = classify(&previous, &current);
        let md = render_report(date(), &delta, &[]);

        assert!(md.starts_with("# Competitor Report: 2025-08-08"));
        assert!(md.contains("1 added, 1 changed, 1 removed, 1 unchanged across 2 companies."));
        assert!(md.contains("## Anthropic\n\nNo changes (0 unchanged)."));
        assert!(md.contains("### Added\n\n- **Fresh \\[beta\\]**: hello"));
        assert!(md.contains("- [GPT-5 launch](https://openai.com/blog/gpt-5) (2025-08-07)"));
        assert!(md.contains("  - before: v1\n  - after: v2"));
        assert!(md.contains("### Removed\n\n- **Old post**"));
        assert!(md.contains("_1 unchanged._"));
        assert!(!md.contains("Could not update"));
        // companies are rendered in name order
        assert!(md.find("## Anthropic").unwrap() < md.find("## OpenAI").unwrap());
    }

    #[test]
    fn test_report_lists_failures() {
        let current = snapshot(vec![("OpenAI", vec![Record::new("OpenAI", "Post", None, None, "a")])]);
        let delta = classify(&Snapshot::default(), &current);
        let failures = vec![
            Failure {
                company: "DeepMind".into(),
                error: ScrapeError::Fetch(FetchError::Timeout),
            },
            Failure {
                company: "Mistral".into(),
                error: ScrapeError::Parse(ParseError::NoMatch {
                    selector: "article".into(),
                }),
            },
        ];

        let md = render_report(date(), &delta, &failures);
        assert!(md.contains("2 companies could not be updated."));
        assert!(md.contains("## Could not update"));
        assert!(md.contains("| DeepMind | Timeout | request timed out |"));
        assert!(md.contains("| Mistral | NoMatch |"));
        assert!(!md.contains("## DeepMind"));
    }

    #[tokio::test]
    async fn test_write_report_names_file_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let report_dir = dir.path().to_str().unwrap();
        let filename = write_report(report_dir, date(), "# hi\n").await.unwrap();
        assert_eq!(filename, "2025-08-08.md");
        let text = std::fs::read_to_string(dir.path().join(&filename)).unwrap();
        assert_eq!(text, "# hi\n");
    }

    #[tokio::test]
    async fn test_write_report_surfaces_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let result = write_report(blocker.to_str().unwrap(), date(), "# hi\n").await;
        assert!(result.is_err());
    }
}
