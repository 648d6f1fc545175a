use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::error::{AppError, Result};
use crate::services::{SharedConfig, open_db};
use ingest::{MANIFEST_FILE_NAME, ManifestTask, read_manifest};
use telemetry_core::{PlanEvent, TaskStatus, validate_path_within_base, validate_plan_name};
use telemetry_db::Db;

const PLAN_EVENT_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Active,
    Complete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn from_tasks(tasks: &[ManifestTask]) -> Self {
        let mut counts = Self {
            total: tasks.len(),
            ..Self::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub name: String,
    pub state: PlanState,
    pub path: String,
    pub counts: TaskCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub summary: PlanSummary,
    pub tasks: Vec<ManifestTask>,
    pub events: Vec<PlanEvent>,
}

#[derive(Clone)]
pub struct PlansService {
    config: SharedConfig,
}

impl PlansService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    fn roots(&self) -> [(&Path, PlanState); 2] {
        [
            (self.config.plans.active_dir.as_path(), PlanState::Active),
            (self.config.plans.complete_dir.as_path(), PlanState::Complete),
        ]
    }

    pub fn list(&self) -> Result<Vec<PlanSummary>> {
        let mut plans = Vec::new();
        for (root, state) in self.roots() {
            let entries = match fs::read_dir(root) {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            for entry in entries {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if validate_plan_name(&name).is_err() {
                    continue;
                }
                let (tasks, _) = read_manifest(&entry.path().join(MANIFEST_FILE_NAME));
                plans.push(summary(name, state, &entry.path(), &tasks));
            }
        }
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    /// Looks a plan up by its (possibly percent-encoded) name.
    pub fn get(&self, raw_name: &str) -> Result<PlanDetail> {
        let name = validate_plan_name(raw_name)?;
        for (root, state) in self.roots() {
            let dir = validate_path_within_base(root, &name)?;
            if !dir.is_dir() {
                continue;
            }
            let (tasks, _) = read_manifest(&dir.join(MANIFEST_FILE_NAME));
            let events = self.db()?.plan_events(&name, PLAN_EVENT_LIMIT)?;
            return Ok(PlanDetail {
                summary: summary(name, state, &dir, &tasks),
                tasks,
                events,
            });
        }
        Err(AppError::NotFound(format!("plan {name} not found")))
    }

    pub fn recent_events(&self, limit: u32) -> Result<Vec<PlanEvent>> {
        Ok(self.db()?.recent_plan_events(limit)?)
    }
}

fn summary(name: String, state: PlanState, dir: &Path, tasks: &[ManifestTask]) -> PlanSummary {
    PlanSummary {
        name,
        state,
        path: dir.to_string_lossy().to_string(),
        counts: TaskCounts::from_tasks(tasks),
    }
}
