use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use telemetry_core::{PlanEvent, TaskStatus, new_event_id, now_timestamp};
use tracing::warn;
use walkdir::WalkDir;

use crate::types::{IngestIssue, PlanBatch};

pub const MANIFEST_FILE_NAME: &str = "manifest.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestTask {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
}

/// Parses manifest content, skipping blank and malformed lines.
pub fn parse_manifest(content: &str, file_path: &str) -> (Vec<ManifestTask>, Vec<IngestIssue>) {
    let mut tasks = Vec::new();
    let mut issues = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ManifestTask>(line) {
            Ok(task) => tasks.push(task),
            Err(err) => {
                warn!(file = file_path, line = index, error = %err, "skipping malformed manifest line");
                issues.push(IngestIssue {
                    file_path: file_path.to_string(),
                    line: Some(index as u64),
                    message: err.to_string(),
                });
            }
        }
    }
    (tasks, issues)
}

pub fn read_manifest(path: &Path) -> (Vec<ManifestTask>, Vec<IngestIssue>) {
    let file_path = path.to_string_lossy().to_string();
    match fs::read_to_string(path) {
        Ok(content) => parse_manifest(&content, &file_path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => (Vec::new(), Vec::new()),
        Err(err) => {
            warn!(file = %file_path, error = %err, "failed to read manifest");
            (
                Vec::new(),
                vec![IngestIssue {
                    file_path,
                    line: None,
                    message: err.to_string(),
                }],
            )
        }
    }
}

pub fn is_manifest_path(path: &Path) -> bool {
    path.file_name().and_then(|name| name.to_str()) == Some(MANIFEST_FILE_NAME)
}

pub fn find_manifests(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut manifests = Vec::new();
    for root in roots {
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(root)
            .min_depth(2)
            .max_depth(2)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if entry.file_type().is_file() && is_manifest_path(entry.path()) {
                manifests.push(entry.into_path());
            }
        }
    }
    manifests.sort();
    manifests
}

pub fn plan_dir(manifest: &Path) -> Option<&Path> {
    manifest.parent()
}

pub fn plan_name(manifest: &Path) -> Option<String> {
    plan_dir(manifest)
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

/// Remembers the last observed status of every task and turns status
/// changes into plan events. Statuses are keyed by plan name, so a plan
/// moved from the active root to the complete root keeps its history.
#[derive(Debug)]
pub struct PlanDiffer {
    session_id: String,
    statuses: HashMap<String, HashMap<String, TaskStatus>>,
}

impl PlanDiffer {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            statuses: HashMap::new(),
        }
    }

    /// Records current statuses without emitting anything.
    pub fn prime(&mut self, roots: &[PathBuf]) -> PlanBatch {
        let mut batch = PlanBatch::default();
        for manifest in find_manifests(roots) {
            let Some(name) = plan_name(&manifest) else {
                continue;
            };
            let (tasks, issues) = read_manifest(&manifest);
            batch.issues.extend(issues);
            let known = self.statuses.entry(name).or_default();
            for task in tasks {
                known.insert(task.id, task.status);
            }
        }
        batch
    }

    pub fn observe(&mut self, manifest: &Path) -> PlanBatch {
        let (tasks, issues) = read_manifest(manifest);
        PlanBatch {
            events: self.diff(manifest, &tasks),
            issues,
        }
    }

    pub fn scan(&mut self, roots: &[PathBuf]) -> PlanBatch {
        let mut batch = PlanBatch::default();
        for manifest in find_manifests(roots) {
            let observed = self.observe(&manifest);
            batch.events.extend(observed.events);
            batch.issues.extend(observed.issues);
        }
        batch
    }

    pub fn diff(&mut self, manifest: &Path, tasks: &[ManifestTask]) -> Vec<PlanEvent> {
        let Some(name) = plan_name(manifest) else {
            return Vec::new();
        };
        let plan_path = plan_dir(manifest)
            .map(|dir| dir.to_string_lossy().to_string())
            .unwrap_or_default();
        let known = self.statuses.entry(name.clone()).or_default();
        let mut events = Vec::new();
        for task in tasks {
            let previous = known.insert(task.id.clone(), task.status);
            if previous == Some(task.status) {
                continue;
            }
            let Some(event_type) = task.status.transition_event() else {
                continue;
            };
            let mut data = Map::new();
            data.insert(
                "previous_status".to_string(),
                previous
                    .map(|status| Value::from(status.as_str()))
                    .unwrap_or(Value::Null),
            );
            data.insert(
                "dependencies".to_string(),
                Value::Array(task.dependencies.iter().cloned().map(Value::from).collect()),
            );
            if let Some(verification) = &task.verification {
                data.insert("verification".to_string(), Value::from(verification.as_str()));
            }
            events.push(PlanEvent {
                id: new_event_id(),
                timestamp: now_timestamp(),
                session_id: self.session_id.clone(),
                event_type,
                plan_name: name.clone(),
                plan_path: plan_path.clone(),
                feature_id: Some(task.id.clone()),
                feature_description: Some(task.description.clone()),
                status: Some(task.status),
                pr_url: None,
                data,
            });
        }
        events
    }

    pub fn tracked_plans(&self) -> usize {
        self.statuses.len()
    }
}
