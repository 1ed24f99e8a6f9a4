//! Data models for extracted records and per-run snapshots.
//!
//! - [`Record`]: one extracted post, immutable once created
//! - [`Snapshot`]: every record produced by one run, keyed by company
//!
//! Records carry a content fingerprint computed from normalized title and
//! snippet text, so two runs that see the same post produce equal
//! fingerprints even if the surrounding markup or whitespace moved.

use crate::utils::{collapse_whitespace, normalize_text};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// SHA-256 (lowercase hex) of plain-text title and snippet.
///
/// Whitespace is collapsed first; every other character, `<` and `>`
/// included, is content.
pub fn fingerprint(title: &str, snippet: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(collapse_whitespace(title).as_bytes());
    hasher.update(b"\n");
    hasher.update(collapse_whitespace(snippet).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A single post extracted from a competitor's page.
///
/// Fields are private; records are built by [`Record::new`] (markup input)
/// or [`Record::from_text`] (plain text), which normalize the text and
/// compute the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    company: String,
    title: String,
    url: Option<String>,
    date: Option<String>,
    snippet: String,
    fingerprint: String,
}

impl Record {
    /// Build a record from title and snippet that may still carry markup.
    pub fn new(
        company: impl Into<String>,
        title: &str,
        url: Option<String>,
        date: Option<String>,
        snippet: &str,
    ) -> Self {
        Self::from_text(
            company,
            &normalize_text(title),
            url,
            date,
            &normalize_text(snippet),
        )
    }

    /// Build a record from text already taken out of the DOM.
    ///
    /// Only whitespace is normalized, so a decoded `a < 90` stays intact.
    pub fn from_text(
        company: impl Into<String>,
        title: &str,
        url: Option<String>,
        date: Option<String>,
        snippet: &str,
    ) -> Self {
        let title = collapse_whitespace(title);
        let snippet = collapse_whitespace(snippet);
        let fingerprint = fingerprint(&title, &snippet);
        Self {
            company: company.into(),
            title,
            url,
            date,
            snippet,
            fingerprint,
        }
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Every record produced by one run, keyed by company name.
///
/// Written once per day by the storage collaborator and read back at the
/// start of the next run. Records keep their extraction order, which the
/// change detector relies on for duplicate-title tie-breaks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The run date this snapshot belongs to.
    pub date: Option<NaiveDate>,
    /// Records per company, in extraction order.
    pub companies: BTreeMap<String, Vec<Record>>,
}

impl Snapshot {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            companies: BTreeMap::new(),
        }
    }

    /// Build a snapshot from `(company, records)` pairs; later pairs for the
    /// same company replace earlier ones.
    pub fn from_companies<I>(date: Option<NaiveDate>, companies: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<Record>)>,
    {
        Self {
            date,
            companies: companies.into_iter().collect(),
        }
    }

    pub fn records(&self, company: &str) -> &[Record] {
        self.companies
            .get(company)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, company: &str) -> bool {
        self.companies.contains_key(company)
    }

    pub fn record_count(&self) -> usize {
        self.companies.values().map(Vec::len).sum()
    }

    /// A copy of this snapshot without the given companies.
    pub fn without<'a, I>(&self, companies: I) -> Snapshot
    where
        I: IntoIterator<Item = &'a str>,
    {
        let drop: BTreeSet<&str> = companies.into_iter().collect();
        Snapshot {
            date: self.date,
            companies: self
                .companies
                .iter()
                .filter(|(name, _)| !drop.contains(name.as_str()))
                .map(|(name, records)| (name.clone(), records.clone()))
                .collect(),
        }
    }

    /// A copy of this snapshot where each failed company that has no fresh
    /// records keeps its records from `previous`.
    ///
    /// Persisting this instead of the partial snapshot keeps tomorrow's diff
    /// from reporting a temporarily unreachable site's posts as new.
    pub fn carry_forward<'a, I>(&self, previous: &Snapshot, failed: I) -> Snapshot
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut merged = self.clone();
        for company in failed {
            if merged.contains(company) {
                continue;
            }
            if let Some(records) = previous.companies.get(company) {
                merged
                    .companies
                    .insert(company.to_string(), records.clone());
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(company: &str, title: &str, snippet: &str) -> Record {
        Record::new(company, title, None, None, snippet)
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = record("OpenAI", "GPT-5 launch", "v1");
        let b = record("OpenAI", "GPT-5 launch", "v1");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), fingerprint("GPT-5 launch", "v1"));
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_formatting() {
        let a = record("OpenAI", "GPT-5 launch", "Today we   release\nGPT-5.");
        let b = record("OpenAI", "  <h2>GPT-5 launch</h2>", "<p>Today we release GPT-5.</p>");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = record("OpenAI", "GPT-5 launch", "v1");
        let b = record("OpenAI", "GPT-5 launch", "v2");
        let c = record("OpenAI", "GPT-5 Launch", "v1");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_fingerprint_keeps_angle_bracket_text() {
        let a = Record::from_text(
            "OpenAI",
            "Bench",
            None,
            None,
            "Score a < 90 on bench and latency > 2s",
        );
        let b = Record::from_text(
            "OpenAI",
            "Bench",
            None,
            None,
            "Score a < 10 on other and latency > 2s",
        );
        assert_eq!(a.snippet(), "Score a < 90 on bench and latency > 2s");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_new_and_from_text_agree_on_escaped_markup() {
        let raw = record("OpenAI", "Bench", "<p>Score a &lt; 90</p>");
        let plain = Record::from_text("OpenAI", "Bench", None, None, "Score a < 90");
        assert_eq!(raw, plain);
    }

    #[test]
    fn test_fingerprint_separates_title_from_snippet() {
        assert_ne!(fingerprint("ab", "c"), fingerprint("a", "bc"));
    }

    #[test]
    fn test_record_normalizes_text() {
        let r = record("Anthropic", "  Claude\n update ", "<p>New <em>model</em></p>");
        assert_eq!(r.title(), "Claude update");
        assert_eq!(r.snippet(), "New model");
        assert_eq!(r.company(), "Anthropic");
    }

    #[test]
    fn test_snapshot_serialization() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 6).unwrap();
        let mut snapshot = Snapshot::new(date);
        snapshot
            .companies
            .insert("OpenAI".into(), vec![record("OpenAI", "Post", "Body")]);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("2025-05-06"));
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.record_count(), 1);
    }

    #[test]
    fn test_without_drops_companies() {
        let snapshot = Snapshot::from_companies(
            None,
            vec![
                ("A".to_string(), vec![record("A", "x", "y")]),
                ("B".to_string(), vec![record("B", "x", "y")]),
            ],
        );
        let trimmed = snapshot.without(["A"]);
        assert!(!trimmed.contains("A"));
        assert!(trimmed.contains("B"));
        assert_eq!(snapshot.record_count(), 2);
    }

    #[test]
    fn test_carry_forward_restores_failed_companies() {
        let previous = Snapshot::from_companies(
            None,
            vec![
                ("A".to_string(), vec![record("A", "old", "y")]),
                ("B".to_string(), vec![record("B", "old", "y")]),
            ],
        );
        let current = Snapshot::from_companies(
            None,
            vec![("A".to_string(), vec![record("A", "new", "y")])],
        );

        let merged = current.carry_forward(&previous, ["A", "B"]);
        assert_eq!(merged.records("A")[0].title(), "new");
        assert_eq!(merged.records("B")[0].title(), "old");
        assert!(current.records("B").is_empty());
    }
}
