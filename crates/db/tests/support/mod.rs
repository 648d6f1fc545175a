#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Map;
use telemetry_core::{
    EventCategory, MetricEntry, MetricSource, PlanEvent, PlanEventType, TaskStatus, TokenUsage,
    calculate_cost,
};
use telemetry_db::Db;
use tempfile::TempDir;

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("timestamp")
        .with_timezone(&Utc)
}

pub fn make_metric(id: &str, timestamp: &str, session_id: &str) -> MetricEntry {
    MetricEntry {
        id: id.to_string(),
        timestamp: timestamp.to_string(),
        session_id: session_id.to_string(),
        project_path: "/work/project".to_string(),
        source: MetricSource::Hook,
        event_type: "tool_use".to_string(),
        event_category: EventCategory::Tool,
        model: None,
        tokens: None,
        cost: None,
        tool_name: Some("Bash".to_string()),
        tool_duration_ms: Some(120),
        tool_success: Some(true),
        data: Map::new(),
        tags: Vec::new(),
    }
}

pub fn make_api_metric(id: &str, timestamp: &str, model: &str, tokens: TokenUsage) -> MetricEntry {
    let mut entry = make_metric(id, timestamp, "session-api");
    entry.source = MetricSource::Transcript;
    entry.event_type = "api_usage".to_string();
    entry.event_category = EventCategory::Api;
    entry.model = Some(model.to_string());
    entry.cost = Some(calculate_cost(&tokens, model));
    entry.tokens = Some(tokens);
    entry.tool_name = None;
    entry.tool_duration_ms = None;
    entry.tool_success = None;
    entry
}

pub fn make_plan_event(
    id: &str,
    timestamp: &str,
    plan_name: &str,
    event_type: PlanEventType,
    status: Option<TaskStatus>,
) -> PlanEvent {
    PlanEvent {
        id: id.to_string(),
        timestamp: timestamp.to_string(),
        session_id: "plan-watcher".to_string(),
        event_type,
        plan_name: plan_name.to_string(),
        plan_path: format!("/work/dev/active/{plan_name}"),
        feature_id: Some("F1".to_string()),
        feature_description: Some("Build the thing".to_string()),
        status,
        pr_url: None,
        data: Map::new(),
    }
}

pub fn tokens(input: u64, output: u64) -> TokenUsage {
    TokenUsage {
        input_tokens: input,
        output_tokens: output,
        cache_read_input_tokens: 0,
        cache_creation_input_tokens: 0,
    }
}
