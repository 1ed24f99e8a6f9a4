//! Text normalization, date formatting, and file system helpers.
//!
//! This module provides helper functions used throughout the application:
//! - Whitespace collapsing and DOM-based markup stripping for fingerprint input
//! - Snippet and log truncation
//! - Date normalization for extracted `<time>` values
//! - Host keys for per-host rate limiting
//! - File system validation for output directories

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Collapse runs of whitespace to single spaces and trim the ends.
///
/// Input is plain text (already pulled out of the DOM), so `<` and `>` are
/// content here and are kept.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Strip markup and collapse whitespace.
///
/// Tags are removed by parsing `s` as an HTML fragment and keeping its text
/// nodes, so entities decode (`&lt;` becomes `<`) and only real elements go.
/// Two strings that differ only in tags, indentation, or line breaks
/// normalize to the same value.
///
/// # Arguments
///
/// * `s` - A string that may contain HTML markup
///
/// # Returns
///
/// The visible text, single-spaced and trimmed.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_text("  <b>GPT-5</b>\n launch "), "GPT-5 launch");
/// assert_eq!(normalize_text("<p>a &lt; 90</p>"), "a < 90");
/// ```
pub fn normalize_text(s: &str) -> String {
    let fragment = Html::parse_fragment(s);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&text)
}

/// Truncate text to `max_chars` characters, ending with `...` when cut.
pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes (rounded down to a char
/// boundary) with an ellipsis and byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Normalize a scraped date to `YYYY-MM-DD` when it is recognizably ISO-ish.
///
/// Only the first 19 characters are considered, so trailing fractional
/// seconds and offsets (`2025-05-06T14:30:00.000Z`) are accepted. Anything
/// else is returned unchanged.
pub fn format_date(raw: &str) -> String {
    let raw = raw.trim();
    let head: String = raw.chars().take(19).collect();

    if let Ok(d) = NaiveDate::parse_from_str(&head, "%Y-%m-%d") {
        return d.format("%Y-%m-%d").to_string();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&head, fmt) {
            return dt.date().format("%Y-%m-%d").to_string();
        }
    }
    raw.to_string()
}

/// Host key used for per-host throttling: the host without a leading `www.`.
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
