use std::io;

use serde::Serialize;
use telemetry_core::{MetricEntry, PlanEvent};

/// Non-fatal issues encountered while reading a file. The offending line is
/// skipped and reading continues.
#[derive(Debug, Clone, Serialize)]
pub struct IngestIssue {
    pub file_path: String,
    pub line: Option<u64>,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct TailBatch {
    pub metrics: Vec<MetricEntry>,
    pub issues: Vec<IngestIssue>,
    pub files_read: usize,
}

impl TailBatch {
    pub(crate) fn absorb(&mut self, other: TailBatch) {
        self.metrics.extend(other.metrics);
        self.issues.extend(other.issues);
        self.files_read += other.files_read;
    }
}

#[derive(Debug, Default)]
pub struct PlanBatch {
    pub events: Vec<PlanEvent>,
    pub issues: Vec<IngestIssue>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
