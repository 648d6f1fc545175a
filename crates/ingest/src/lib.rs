mod manifest;
mod parser;
mod tailer;
mod types;
mod watch;

pub use manifest::{
    MANIFEST_FILE_NAME, ManifestTask, PlanDiffer, find_manifests, is_manifest_path,
    parse_manifest, plan_dir, plan_name, read_manifest,
};
pub use parser::{LineOutcome, TRANSCRIPT_EVENT_TYPE, parse_transcript_line, transcript_metric_id};
pub use tailer::TranscriptTailer;
pub use types::{IngestError, IngestIssue, PlanBatch, Result, TailBatch};
pub use watch::{
    BackendKind, NotifyBackend, PollBackend, WatchBackend, WatchEvent, WatchGuard, WatchOptions,
    Watcher, start_watcher,
};

pub fn is_transcript_path(path: &std::path::Path) -> bool {
    tailer::is_transcript_path(path)
}
