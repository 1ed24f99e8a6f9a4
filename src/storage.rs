//! Date-keyed snapshot storage.
//!
//! The run only needs "read the previous snapshot" and "write today's". The
//! [`SnapshotStore`] trait keeps that seam narrow; [`JsonDirStore`] keeps one
//! pretty-printed JSON file per day and [`MemoryStore`] backs tests.
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! ├── 2025-05-05.json
//! └── 2025-05-06.json
//! ```

use crate::errors::StoreError;
use crate::models::Snapshot;
use chrono::NaiveDate;
#[cfg(test)]
use std::cell::RefCell;
#[cfg(test)]
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Read and write snapshots by run date.
pub trait SnapshotStore {
    /// The snapshot stored for exactly `date`, if any.
    async fn get(&self, date: NaiveDate) -> Result<Option<Snapshot>, StoreError>;

    /// Store `snapshot` under `date`, replacing any previous one.
    async fn put(&self, date: NaiveDate, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Dates that have a stored snapshot, ascending.
    async fn dates(&self) -> Result<Vec<NaiveDate>, StoreError>;

    /// Delete a stored snapshot. Missing dates are not an error.
    async fn delete(&self, date: NaiveDate) -> Result<(), StoreError>;

    /// The most recent snapshot strictly before `date`.
    ///
    /// Daily runs normally find yesterday's; after a skipped day this falls
    /// back to the last one that exists.
    async fn latest_before(
        &self,
        date: NaiveDate,
    ) -> Result<Option<(NaiveDate, Snapshot)>, StoreError> {
        let Some(found) = self.dates().await?.into_iter().rev().find(|d| *d < date) else {
            return Ok(None);
        };
        Ok(self.get(found).await?.map(|s| (found, s)))
    }

    /// Delete every snapshot older than `cutoff`.
    ///
    /// # Arguments
    ///
    /// * `cutoff` - Snapshots dated strictly before this are removed
    ///
    /// # Returns
    ///
    /// How many snapshots were deleted.
    async fn prune_before(&self, cutoff: NaiveDate) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for date in self.dates().await?.into_iter().filter(|d| *d < cutoff) {
            self.delete(date).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

/// One `{YYYY-MM-DD}.json` file per snapshot in a directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Create a store rooted at `dir`.
    ///
    /// The directory is created on the first [`put`](SnapshotStore::put);
    /// reading from a missing directory finds no snapshots.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = JsonDirStore::new("data/snapshots");
    /// let previous = store.latest_before(date).await?;
    /// ```
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl SnapshotStore for JsonDirStore {
    #[instrument(level = "info", skip_all, fields(%date))]
    async fn get(&self, date: NaiveDate) -> Result<Option<Snapshot>, StoreError> {
        let path = self.path_for(date);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No snapshot stored");
                return Ok(None);
            }
            Err(e) => return Err(io_error(&path, e)),
        };
        let snapshot = serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(snapshot))
    }

    #[instrument(level = "info", skip_all, fields(%date))]
    async fn put(&self, date: NaiveDate, snapshot: &Snapshot) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let path = self.path_for(date);
        let json = serde_json::to_string_pretty(snapshot).map_err(|source| StoreError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;
        fs::write(&path, json)
            .await
            .map_err(|e| io_error(&path, e))?;
        info!(path = %path.display(), records = snapshot.record_count(), "Wrote snapshot");
        Ok(())
    }

    async fn dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir, e)),
        };

        let mut dates = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                Ok(date) => dates.push(date),
                Err(_) => warn!(path = %path.display(), "Ignoring file with non-date name"),
            }
        }
        dates.sort();
        Ok(dates)
    }

    async fn delete(&self, date: NaiveDate) -> Result<(), StoreError> {
        let path = self.path_for(date);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "Deleted snapshot");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: RefCell<BTreeMap<NaiveDate, Snapshot>>,
}

#[cfg(test)]
impl SnapshotStore for MemoryStore {
    async fn get(&self, date: NaiveDate) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.snapshots.borrow().get(&date).cloned())
    }

    async fn put(&self, date: NaiveDate, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.snapshots.borrow_mut().insert(date, snapshot.clone());
        Ok(())
    }

    async fn dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        Ok(self.snapshots.borrow().keys().copied().collect())
    }

    async fn delete(&self, date: NaiveDate) -> Result<(), StoreError> {
        self.snapshots.borrow_mut().remove(&date);
        Ok(())
    }
}
