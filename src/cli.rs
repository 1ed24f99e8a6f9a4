//! Command-line interface definitions for rival_watch.
//!
//! All arguments can be provided via command-line flags or environment
//! variables. Directory flags override the values in the config file.

use chrono::NaiveDate;
use clap::Parser;

/// Command-line arguments for rival_watch.
///
/// # Examples
///
/// ```sh
/// # Daily run with the settings from config.json
/// rival_watch -c config.json
///
/// # Preview today's report without writing anything
/// rival_watch -c config.json --dry-run
///
/// # Re-run a past day into a scratch directory
/// rival_watch -c config.yaml --date 2025-08-07 -r /tmp/reports -d /tmp/data
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the config file (.json, otherwise YAML)
    #[arg(short, long, env = "RIVAL_WATCH_CONFIG", default_value = "config.json")]
    pub config: String,

    /// Output directory for the markdown reports
    #[arg(short, long, env = "RIVAL_WATCH_REPORT_DIR")]
    pub report_dir: Option<String>,

    /// Directory holding one JSON snapshot per day
    #[arg(short, long, env = "RIVAL_WATCH_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Run date (YYYY-MM-DD); defaults to today in local time
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Print the report to stdout and do not write snapshots or reports
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["rival_watch"]);
        assert_eq!(cli.config, "config.json");
        assert!(cli.report_dir.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "rival_watch",
            "-c",
            "tracker.yaml",
            "-r",
            "/tmp/reports",
            "-d",
            "/tmp/data",
            "--date",
            "2025-08-07",
            "--dry-run",
        ]);

        assert_eq!(cli.config, "tracker.yaml");
        assert_eq!(cli.report_dir.as_deref(), Some("/tmp/reports"));
        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/data"));
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2025, 8, 7));
        assert!(cli.dry_run);
    }

    #[test]
    fn test_cli_rejects_bad_date() {
        assert!(Cli::try_parse_from(["rival_watch", "--date", "yesterday"]).is_err());
    }
}
