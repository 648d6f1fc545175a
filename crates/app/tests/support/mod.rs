#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::{TempDir, tempdir};
use telemetry_app::{AppState, TelemetryConfig};
use telemetry_core::{CostBreakdown, EventCategory, MetricEntry, MetricSource, TokenUsage};

pub struct TestApp {
    pub _dir: TempDir,
    pub root: PathBuf,
    pub state: AppState,
}

pub fn test_config(root: &Path) -> TelemetryConfig {
    let mut config = TelemetryConfig::defaults(root, root.join("data"));
    config.transcript.projects_dir = root.join("projects");
    config.transcript.use_fs_watch = false;
    config.transcript.fallback_poll_interval = Duration::from_millis(25);
    config.plans.active_dir = root.join("plans").join("active");
    config.plans.complete_dir = root.join("plans").join("complete");
    config.collector.flush_interval = Duration::from_millis(20);
    config
}

pub fn setup_app() -> TestApp {
    setup_app_with(|_| {})
}

pub fn setup_app_with(adjust: impl FnOnce(&mut TelemetryConfig)) -> TestApp {
    let dir = tempdir().expect("temp dir");
    let root = dir.path().to_path_buf();
    let mut config = test_config(&root);
    adjust(&mut config);
    let state = AppState::new(config);
    state.setup_db().expect("setup db");
    TestApp {
        _dir: dir,
        root,
        state,
    }
}

pub fn metric(id: &str, timestamp: &str, model: Option<&str>) -> MetricEntry {
    MetricEntry {
        id: id.to_string(),
        timestamp: timestamp.to_string(),
        session_id: "session-1".to_string(),
        project_path: "/work/repo".to_string(),
        source: MetricSource::Hook,
        event_type: "tool_use".to_string(),
        event_category: EventCategory::Tool,
        model: model.map(str::to_string),
        tokens: None,
        cost: None,
        tool_name: Some("Bash".to_string()),
        tool_duration_ms: Some(40),
        tool_success: Some(true),
        data: Default::default(),
        tags: Vec::new(),
    }
}

pub fn priced_metric(id: &str, timestamp: &str, model: &str, cost: f64) -> MetricEntry {
    MetricEntry {
        source: MetricSource::Transcript,
        event_type: "api_usage".to_string(),
        event_category: EventCategory::Api,
        tokens: Some(TokenUsage {
            input_tokens: 100,
            output_tokens: 10,
            cache_read_input_tokens: 0,
            cache_creation_input_tokens: 0,
        }),
        cost: Some(CostBreakdown::from_components(cost, 0.0, 0.0, 0.0)),
        tool_name: None,
        tool_duration_ms: None,
        tool_success: None,
        ..metric(id, timestamp, Some(model))
    }
}
