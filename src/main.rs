//! # rival_watch
//!
//! Polls a handful of AI company blogs, compares what it finds with the
//! previous run, and writes a daily markdown report of what was added,
//! changed, or removed.
//!
//! ## Usage
//!
//! ```sh
//! rival_watch -c config.json
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Configuration**: Load and validate the competitor list
//! 2. **Previous run**: Read the latest stored snapshot before the run date
//! 3. **Scraping**: Fetch and extract every competitor (bounded concurrency,
//!    per-host throttling, retries, overall deadline)
//! 4. **Change detection**: Classify records against the previous snapshot
//! 5. **Output**: Write the markdown report, update the index, persist the
//!    new snapshot, and prune old ones
//!
//! Scheduling is left to cron or a systemd timer.

use chrono::{Duration, Local};
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod detect;
mod errors;
mod extract;
mod fetch;
mod models;
mod outputs;
mod run;
mod storage;
mod utils;

use cli::Cli;
use config::Config;
use fetch::{HttpFetcher, RetryFetch, Throttled};
use models::Snapshot;
use outputs::{indexes, markdown};
use storage::{JsonDirStore, SnapshotStore};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("rival_watch starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // ---- Configuration ----
    let config = Config::load(&args.config).inspect_err(|e| {
        error!(path = %args.config, error = %e, "Failed to load configuration");
    })?;
    let competitors = config.validate().inspect_err(|e| {
        error!(error = %e, "Invalid configuration; aborting before any request");
    })?;
    let options = config.run_options();
    let report_dir = args.report_dir.clone().unwrap_or_else(|| config.report_dir.clone());
    let data_dir = args.data_dir.clone().unwrap_or_else(|| config.data_dir.clone());
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    info!(%date, competitors = competitors.len(), %report_dir, %data_dir, "Configuration ready");

    if !args.dry_run {
        if let Err(e) = ensure_writable_dir(&report_dir).await {
            error!(
                path = %report_dir,
                error = %e,
                "Report directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    // ---- Previous snapshot ----
    let store = JsonDirStore::new(&data_dir);
    let previous = match store.latest_before(date).await {
        Ok(Some((prev_date, snapshot))) => {
            info!(%prev_date, records = snapshot.record_count(), "Loaded previous snapshot");
            snapshot
        }
        Ok(None) => {
            info!("No previous snapshot; every record will be reported as added");
            Snapshot::default()
        }
        Err(e) => {
            warn!(error = %e, "Could not read previous snapshot; treating run as first");
            Snapshot::default()
        }
    };

    // ---- Scrape and compare ----
    let fetcher = RetryFetch::new(
        Throttled::new(
            HttpFetcher::new(options.request_timeout, &options.user_agent)?,
            options.host_interval,
        ),
        options.retry_count,
        options.retry_backoff,
    );
    let outcome = run::run(date, &competitors, &options, &previous, &fetcher).await?;

    let report = markdown::render_report(date, &outcome.delta, &outcome.failures);

    if args.dry_run {
        println!("{report}");
    } else {
        // ---- Markdown output ----
        let report_filename = markdown::write_report(&report_dir, date, &report)
            .await
            .inspect_err(|e| {
                error!(path = %report_dir, error = %e, "Failed writing report; snapshot not stored");
            })?;

        if let Err(e) = indexes::update_report_index(
            &report_dir,
            date,
            &report_filename,
            &outcome.delta,
            outcome.failures.len(),
        )
        .await
        {
            error!(error = %e, "Failed to update report index");
        }

        // ---- Snapshot persistence ----
        let to_store = outcome
            .snapshot
            .carry_forward(&previous, outcome.failed_companies());
        if let Err(e) = store.put(date, &to_store).await {
            error!(error = %e, "Failed to persist snapshot; tomorrow's report will diff against an older one");
        }

        if config.retain_days > 0 {
            let cutoff = date - Duration::days(i64::from(config.retain_days));
            match store.prune_before(cutoff).await {
                Ok(deleted) => info!(deleted, %cutoff, "Pruned old snapshots"),
                Err(e) => warn!(error = %e, "Failed to prune old snapshots"),
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        updated = outcome.succeeded(),
        failed = outcome.failures.len(),
        "Execution complete"
    );

    outcome.check()?;
    Ok(())
}
