//! Change detection between two snapshots.
//!
//! [`classify`] is a pure function of the previous and current
//! [`Snapshot`]. Records are matched on `(company, title)`:
//!
//! | previous            | current             | outcome   |
//! |---------------------|---------------------|-----------|
//! | same key, same hash | same key            | unchanged |
//! | same key, new hash  | same key            | changed   |
//! | absent              | present             | added     |
//! | present             | key absent          | removed   |
//!
//! When the previous snapshot holds several records with the same title for
//! one company, the current record is compared with the last of them (the
//! most recently seen).

use crate::models::{Record, Snapshot};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A record whose content changed between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changed {
    pub previous: Record,
    pub current: Record,
}

/// Classification for one company.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyDelta {
    pub added: Vec<Record>,
    pub changed: Vec<Changed>,
    pub removed: Vec<Record>,
    pub unchanged: Vec<Record>,
}

impl CompanyDelta {
    /// True when nothing was added, changed, or removed.
    pub fn is_quiet(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Added, changed, removed, and unchanged records per company, ordered by
/// company name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportDelta {
    pub companies: BTreeMap<String, CompanyDelta>,
}

impl ReportDelta {
    pub fn get(&self, company: &str) -> Option<&CompanyDelta> {
        self.companies.get(company)
    }

    pub fn added_count(&self) -> usize {
        self.companies.values().map(|d| d.added.len()).sum()
    }

    pub fn changed_count(&self) -> usize {
        self.companies.values().map(|d| d.changed.len()).sum()
    }

    pub fn removed_count(&self) -> usize {
        self.companies.values().map(|d| d.removed.len()).sum()
    }

    pub fn unchanged_count(&self) -> usize {
        self.companies.values().map(|d| d.unchanged.len()).sum()
    }

    /// True when no company has any added, changed, or removed record.
    pub fn is_quiet(&self) -> bool {
        self.companies.values().all(CompanyDelta::is_quiet)
    }
}

fn classify_company(previous: &[Record], current: &[Record]) -> CompanyDelta {
    // Later entries overwrite earlier ones: duplicates resolve to the last seen.
    let latest: HashMap<&str, &Record> = previous.iter().map(|r| (r.title(), r)).collect();
    let current_titles: HashSet<&str> = current.iter().map(Record::title).collect();

    let mut delta = CompanyDelta::default();
    for record in current {
        match latest.get(record.title()) {
            None => delta.added.push(record.clone()),
            Some(prev) if prev.fingerprint() == record.fingerprint() => {
                delta.unchanged.push(record.clone())
            }
            Some(prev) => delta.changed.push(Changed {
                previous: (*prev).clone(),
                current: record.clone(),
            }),
        }
    }
    delta.removed = previous
        .iter()
        .filter(|r| !current_titles.contains(r.title()))
        .cloned()
        .collect();
    delta
}

/// Compare two snapshots.
///
/// Companies that appear only in `current` (first-time tracking) have all
/// their records added and nothing removed.
///
/// # Arguments
///
/// * `previous` - The last stored snapshot, already stripped of companies
///   that should not be compared
/// * `current` - This run's snapshot
///
/// # Returns
///
/// A [`ReportDelta`] over the union of both company sets, ordered by name.
/// Records match by title; equal fingerprints are unchanged, different ones
/// changed. A duplicate title in `previous` matches its last occurrence.
///
/// # Example
///
/// ```ignore
/// let delta = classify(&snapshot, &snapshot);
/// assert_eq!(delta.added_count() + delta.changed_count() + delta.removed_count(), 0);
/// ```
pub fn classify(previous: &Snapshot, current: &Snapshot) -> ReportDelta {
    let names = previous
        .companies
        .keys()
        .chain(current.companies.keys())
        .cloned()
        .collect::<BTreeSet<String>>();

    let companies = names
        .into_iter()
        .map(|name| {
            let delta = classify_company(previous.records(&name), current.records(&name));
            (name, delta)
        })
        .collect();
    ReportDelta { companies }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(company: &str, title: &str, text: &str) -> Record {
        Record::new(company, title, None, None, text)
    }

    fn snapshot(entries: Vec<(&str, Vec<Record>)>) -> Snapshot {
        Snapshot::from_companies(
            None,
            entries
                .into_iter()
                .map(|(name, records)| (name.to_string(), records)),
        )
    }

    #[test]
    fn test_identical_snapshots_are_quiet() {
        let s = snapshot(vec![
            (
                "OpenAI",
                vec![record("OpenAI", "GPT-5 launch", "v1"), record("OpenAI", "Safety", "x")],
            ),
            ("Anthropic", vec![record("Anthropic", "Claude", "y")]),
        ]);
        let delta = classify(&s, &s.clone());
        assert!(delta.is_quiet());
        assert_eq!(delta.added_count(), 0);
        assert_eq!(delta.changed_count(), 0);
        assert_eq!(delta.removed_count(), 0);
        assert_eq!(delta.unchanged_count(), 3);
    }

    #[test]
    fn test_changed_text_is_one_changed_entry() {
        let previous = snapshot(vec![("OpenAI", vec![record("OpenAI", "GPT-5 launch", "v1")])]);
        let current = snapshot(vec![("OpenAI", vec![record("OpenAI", "GPT-5 launch", "v2")])]);

        let delta = classify(&previous, &current);
        let openai = delta.get("OpenAI").unwrap();
        assert_eq!(openai.changed.len(), 1);
        assert_eq!(openai.changed[0].previous.snippet(), "v1");
        assert_eq!(openai.changed[0].current.snippet(), "v2");
        assert!(openai.added.is_empty());
        assert!(openai.removed.is_empty());
        assert!(openai.unchanged.is_empty());
    }

    #[test]
    fn test_added_and_removed() {
        let previous = snapshot(vec![("OpenAI", vec![record("OpenAI", "Old post", "a")])]);
        let current = snapshot(vec![("OpenAI", vec![record("OpenAI", "New post", "b")])]);

        let delta = classify(&previous, &current);
        let openai = delta.get("OpenAI").unwrap();
        assert_eq!(openai.added[0].title(), "New post");
        assert_eq!(openai.removed[0].title(), "Old post");
        assert!(!delta.is_quiet());
    }

    #[test]
    fn test_formatting_only_change_is_unchanged() {
        let previous = snapshot(vec![("OpenAI", vec![record("OpenAI", "GPT-5 launch", "Hello world")])]);
        let current = snapshot(vec![(
            "OpenAI",
            vec![record("OpenAI", "GPT-5 launch", "<p>Hello\n   world</p>")],
        )]);
        assert!(classify(&previous, &current).is_quiet());
    }

    #[test]
    fn test_duplicate_titles_match_most_recent() {
        let previous = snapshot(vec![(
            "OpenAI",
            vec![
                record("OpenAI", "Update", "first version"),
                record("OpenAI", "Update", "second version"),
            ],
        )]);
        let current = snapshot(vec![("OpenAI", vec![record("OpenAI", "Update", "second version")])]);

        let delta = classify(&previous, &current);
        let openai = delta.get("OpenAI").unwrap();
        assert_eq!(openai.unchanged.len(), 1);
        assert!(openai.changed.is_empty());
        assert!(openai.added.is_empty());
        assert!(openai.removed.is_empty());
    }

    #[test]
    fn test_duplicate_titles_compare_against_last_only() {
        let previous = snapshot(vec![(
            "OpenAI",
            vec![
                record("OpenAI", "Update", "first version"),
                record("OpenAI", "Update", "second version"),
            ],
        )]);
        let current = snapshot(vec![("OpenAI", vec![record("OpenAI", "Update", "first version")])]);

        let openai = classify(&previous, &current).companies.remove("OpenAI").unwrap();
        assert_eq!(openai.changed.len(), 1);
        assert_eq!(openai.changed[0].previous.snippet(), "second version");
    }

    #[test]
    fn test_first_time_company_is_all_added() {
        let previous = snapshot(vec![("OpenAI", vec![record("OpenAI", "Post", "a")])]);
        let current = snapshot(vec![
            ("OpenAI", vec![record("OpenAI", "Post", "a")]),
            (
                "Mistral",
                vec![record("Mistral", "Le Chat", "x"), record("Mistral", "Codestral", "y")],
            ),
        ]);

        let delta = classify(&previous, &current);
        let mistral = delta.get("Mistral").unwrap();
        assert_eq!(mistral.added.len(), 2);
        assert!(mistral.removed.is_empty());
        assert!(delta.get("OpenAI").unwrap().is_quiet());
    }

    #[test]
    fn test_company_missing_from_current_is_all_removed() {
        let previous = snapshot(vec![("Cohere", vec![record("Cohere", "Command", "a")])]);
        let delta = classify(&previous, &Snapshot::default());
        assert_eq!(delta.get("Cohere").unwrap().removed.len(), 1);
    }

    #[test]
    fn test_companies_are_ordered_by_name() {
        let current = snapshot(vec![
            ("xAI", vec![record("xAI", "Grok", "a")]),
            ("Anthropic", vec![record("Anthropic", "Claude", "b")]),
            ("Google", vec![record("Google", "Gemini", "c")]),
        ]);
        let delta = classify(&Snapshot::default(), &current);
        let names: Vec<&str> = delta.companies.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Anthropic", "Google", "xAI"]);
    }
}
