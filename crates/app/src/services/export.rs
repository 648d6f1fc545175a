use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::{AppError, Result};
use crate::services::{SharedConfig, open_db, write_jsonl};
use telemetry_db::Db;

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Line-delimited JSON; both names produce the same layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Jsonl,
    Ndjson,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Ndjson => "ndjson",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jsonl" => Ok(Self::Jsonl),
            "ndjson" => Ok(Self::Ndjson),
            other => Err(AppError::InvalidInput(format!(
                "unsupported export format {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub format: ExportFormat,
}

#[derive(Clone)]
pub struct ExportService {
    config: SharedConfig,
}

impl ExportService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    /// Writes every metric in `[start, end)` to a new file under the exports
    /// directory, oldest first. Existing exports are never overwritten.
    pub fn export(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        format: ExportFormat,
        now: DateTime<Utc>,
    ) -> Result<ExportSummary> {
        let rows = self.db()?.metrics_in_range(start, end)?;
        let dir = self.config.exports_dir();
        fs::create_dir_all(&dir)?;
        let stem = format!("metrics-{}", now.format("%Y%m%dT%H%M%S%.3fZ"));
        let (path, file) = create_export_file(&dir, &stem)?;
        write_jsonl(file, &rows)?;
        info!(
            path = %path.display(),
            rows = rows.len(),
            export_format = format.as_str(),
            "metrics exported"
        );
        Ok(ExportSummary {
            path,
            rows: rows.len(),
            format,
        })
    }
}

/// Creates `<stem>.jsonl`, or `<stem>-<n>.jsonl` when earlier exports already
/// took the name.
fn create_export_file(dir: &Path, stem: &str) -> Result<(PathBuf, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{stem}.jsonl")
        } else {
            format!("{stem}-{attempt}.jsonl")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(AppError::Message(format!("no free export file name for {stem}")))
}
