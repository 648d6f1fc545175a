use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::services::{SharedConfig, open_db, write_jsonl};
use telemetry_db::Db;

const ARCHIVE_PREFIX: &str = "metrics-";
const ARCHIVE_SUFFIX: &str = ".jsonl";

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveSummary {
    pub archived: usize,
    pub archive_file: Option<PathBuf>,
    pub removed_files: Vec<PathBuf>,
}

#[derive(Clone)]
pub struct ArchiveService {
    config: SharedConfig,
}

impl ArchiveService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    /// Moves metrics older than `archiveAfterDays` into a dated archive file
    /// and removes archive files older than `deleteArchivesAfterDays`.
    pub fn run(&self, now: DateTime<Utc>) -> Result<ArchiveSummary> {
        let mut summary = ArchiveSummary::default();
        let cutoff = now - Duration::days(self.config.archive_after_days as i64);
        let mut db = self.db()?;
        let rows = db.metrics_in_range(None, Some(cutoff))?;
        if !rows.is_empty() {
            fs::create_dir_all(&self.config.archive_dir)?;
            let path = self.config.archive_dir.join(archive_file_name(cutoff.date_naive()));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            write_jsonl(file, &rows)?;
            summary.archived = db.delete_metrics_before(cutoff)?;
            info!(path = %path.display(), rows = summary.archived, "metrics archived");
            summary.archive_file = Some(path);
        }
        summary.removed_files = self.prune(now)?;
        Ok(summary)
    }

    fn prune(&self, now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
        let oldest_kept =
            (now - Duration::days(self.config.delete_archives_after_days as i64)).date_naive();
        let entries = match fs::read_dir(&self.config.archive_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut removed = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(date) = entry.file_name().to_str().and_then(archive_date) else {
                continue;
            };
            if date < oldest_kept {
                fs::remove_file(entry.path())?;
                info!(path = %entry.path().display(), "expired archive removed");
                removed.push(entry.path());
            }
        }
        removed.sort();
        Ok(removed)
    }
}

fn archive_file_name(date: NaiveDate) -> String {
    format!("{ARCHIVE_PREFIX}{}{ARCHIVE_SUFFIX}", date.format("%Y-%m-%d"))
}

fn archive_date(file_name: &str) -> Option<NaiveDate> {
    let date = file_name
        .strip_prefix(ARCHIVE_PREFIX)?
        .strip_suffix(ARCHIVE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_names_round_trip_their_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).expect("date");
        let name = archive_file_name(date);
        assert_eq!(name, "metrics-2025-03-09.jsonl");
        assert_eq!(archive_date(&name), Some(date));
        assert_eq!(archive_date("metrics-latest.jsonl"), None);
        assert_eq!(archive_date("notes-2025-03-09.jsonl"), None);
    }
}
