//! One scrape-and-compare run over every configured competitor.
//!
//! Competitors are scraped concurrently (bounded by `workers`), each into
//! its own result slot; the slots are merged in configuration order once
//! all of them finish or the run deadline passes. A failure for one
//! competitor is recorded and never stops the others.

use crate::config::{CompetitorConfig, RunOptions};
use crate::detect::{classify, ReportDelta};
use crate::errors::{ConfigError, FailureKind, FetchError, RunError, ScrapeError};
use crate::extract::extract_records;
use crate::fetch::Fetch;
use crate::models::{Record, Snapshot};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, instrument, warn};
use url::Url;

/// A competitor that could not be updated this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub company: String,
    pub error: ScrapeError,
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Records from the competitors that succeeded.
    pub snapshot: Snapshot,
    pub delta: ReportDelta,
    /// Failed competitors, in configuration order.
    pub failures: Vec<Failure>,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn succeeded(&self) -> usize {
        self.snapshot.companies.len()
    }

    pub fn hit_deadline(&self) -> bool {
        self.failures
            .iter()
            .any(|f| f.error == ScrapeError::Deadline)
    }

    /// Run-level verdict: a deadline hit with nothing updated is a failure.
    pub fn check(&self) -> Result<(), RunError> {
        if self.hit_deadline() && self.succeeded() == 0 {
            return Err(RunError::TimedOut {
                elapsed_secs: self.elapsed.as_secs(),
            });
        }
        Ok(())
    }

    pub fn failed_companies(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.company.as_str())
    }
}

async fn scrape_one<F: Fetch>(
    fetcher: &F,
    competitor: &CompetitorConfig,
) -> Result<Vec<Record>, ScrapeError> {
    let url = Url::parse(&competitor.url)
        .map_err(|e| FetchError::Transport(format!("invalid url: {e}")))?;
    let body = fetcher.fetch(&url).await?;
    Ok(extract_records(&body, &url, competitor)?)
}

/// Scrape every competitor and compare against `previous`.
///
/// Companies that fail this run are left out of the comparison, so their
/// earlier records are not reported as removed. Companies present in
/// `previous` but no longer configured are ignored as well.
///
/// # Errors
///
/// [`RunError::Config`] when there is nothing to run or no worker to run
/// it; per-competitor problems end up in [`RunOutcome::failures`].
#[instrument(level = "info", skip_all, fields(%date, competitors = competitors.len()))]
pub async fn run<F: Fetch>(
    date: NaiveDate,
    competitors: &[CompetitorConfig],
    options: &RunOptions,
    previous: &Snapshot,
    fetcher: &F,
) -> Result<RunOutcome, RunError> {
    if competitors.is_empty() {
        return Err(ConfigError::Empty.into());
    }
    if options.workers == 0 {
        return Err(ConfigError::InvalidOption {
            option: "workers",
            reason: "must be at least 1".into(),
        }
        .into());
    }

    let started = Instant::now();
    let deadline = started + options.run_timeout;
    info!(workers = options.workers, run_timeout = ?options.run_timeout, "Starting run");

    let mut slots: Vec<(usize, Result<Vec<Record>, ScrapeError>)> =
        stream::iter(competitors.iter().enumerate())
            .map(|(i, competitor)| async move {
                if Instant::now() >= deadline {
                    return (i, Err(ScrapeError::Deadline));
                }
                let result = timeout_at(deadline, scrape_one(fetcher, competitor))
                    .await
                    .unwrap_or(Err(ScrapeError::Deadline));
                (i, result)
            })
            .buffer_unordered(options.workers)
            .collect()
            .await;
    slots.sort_by_key(|(i, _)| *i);

    let mut snapshot = Snapshot::new(date);
    let mut failures = Vec::new();
    for (i, result) in slots {
        let name = &competitors[i].name;
        match result {
            Ok(records) => {
                info!(company = %name, records = records.len(), "Competitor updated");
                snapshot.companies.insert(name.clone(), records);
            }
            Err(e) => {
                warn!(company = %name, kind = %e.kind(), error = %e, "Competitor could not be updated");
                failures.push(Failure {
                    company: name.clone(),
                    error: e,
                });
            }
        }
    }

    let configured: BTreeSet<&str> = competitors.iter().map(|c| c.name.as_str()).collect();
    let failed: BTreeSet<&str> = failures.iter().map(|f| f.company.as_str()).collect();
    let comparable = previous.without(
        previous
            .companies
            .keys()
            .map(String::as_str)
            .filter(|name| failed.contains(name) || !configured.contains(name)),
    );
    let delta = classify(&comparable, &snapshot);

    let outcome = RunOutcome {
        snapshot,
        delta,
        failures,
        elapsed: started.elapsed(),
    };
    if outcome.hit_deadline() {
        error!(
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            succeeded = outcome.succeeded(),
            "Run deadline exceeded; reporting partial results"
        );
    }
    info!(
        succeeded = outcome.succeeded(),
        failed = outcome.failures.len(),
        added = outcome.delta.added_count(),
        changed = outcome.delta.changed_count(),
        removed = outcome.delta.removed_count(),
        "Run complete"
    );
    Ok(outcome)
}
