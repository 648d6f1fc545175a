mod support;

use std::fs;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Map;
use support::{metric, priced_metric, setup_app, setup_app_with};
use telemetry_app::{AppError, ExportFormat, PlanState};
use telemetry_core::{AggregateMetric, GroupBy, Period, PlanEvent, PlanEventType, TaskStatus};
use telemetry_db::{AggregationQuery, MetricQuery};

fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("timestamp")
        .with_timezone(&Utc)
}

#[test]
fn metrics_service_returns_inserted_rows() {
    let app = setup_app();
    let mut db = app.state.open_db().expect("open db");
    let entries = vec![
        metric("a", "2025-06-01T10:00:00.000Z", None),
        metric("b", "2025-06-01T11:00:00.000Z", Some("claude-sonnet-4-20250514")),
    ];
    db.insert_metrics(&entries).expect("insert");

    let rows = app
        .state
        .services
        .metrics
        .query(&MetricQuery::default())
        .expect("query");
    let mut ids: Vec<_> = rows.iter().map(|row| row.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(app.state.services.metrics.count().expect("count"), 2);
}

#[test]
fn aggregation_rejects_oversized_and_inverted_ranges() {
    let app = setup_app();
    let service = &app.state.services.aggregation;
    let too_wide = AggregationQuery {
        period: Period::Hour,
        metric: AggregateMetric::Count,
        group_by: None,
        start: at("2020-01-01T00:00:00Z"),
        end: at("2025-01-01T00:00:00Z"),
    };
    assert!(matches!(
        service.aggregate(&too_wide, false),
        Err(AppError::InvalidInput(_))
    ));

    let inverted = AggregationQuery {
        start: at("2025-01-02T00:00:00Z"),
        end: at("2025-01-01T00:00:00Z"),
        ..too_wide
    };
    assert!(matches!(
        service.aggregate(&inverted, false),
        Err(AppError::InvalidInput(_))
    ));

    let monthly = AggregationQuery {
        period: Period::Month,
        ..too_wide
    };
    assert!(service.aggregate(&monthly, false).expect("monthly").is_empty());
}

#[test]
fn cached_rollups_match_a_fresh_scan() {
    let app = setup_app();
    let mut db = app.state.open_db().expect("open db");
    db.insert_metrics(&[
        priced_metric("m1", "2025-06-01T10:15:00.000Z", "claude-sonnet-4-20250514", 0.5),
        priced_metric("m2", "2025-06-01T10:45:00.000Z", "claude-opus-4-20250514", 0.25),
        priced_metric("m3", "2025-06-01T11:30:00.000Z", "claude-sonnet-4-20250514", 0.125),
    ])
    .expect("insert");

    let service = &app.state.services.aggregation;
    let written = service
        .refresh_cache(at("2025-06-01T12:30:00Z"))
        .expect("refresh");
    assert!(written > 0);

    let hourly = AggregationQuery {
        period: Period::Hour,
        metric: AggregateMetric::Count,
        group_by: None,
        start: at("2025-06-01T10:00:00Z"),
        end: at("2025-06-01T12:00:00Z"),
    };
    let cached = service.aggregate(&hourly, true).expect("cached");
    let scanned = service.aggregate(&hourly, false).expect("scan");
    assert_eq!(cached, scanned);
    let values: Vec<f64> = cached.iter().map(|row| row.value).collect();
    assert_eq!(values, vec![2.0, 1.0]);

    let by_model = AggregationQuery {
        metric: AggregateMetric::Cost,
        group_by: Some(GroupBy::Model),
        ..hourly
    };
    assert_eq!(
        service.aggregate(&by_model, true).expect("cached by model"),
        service.aggregate(&by_model, false).expect("scan by model")
    );
}

#[test]
fn cost_report_sums_models_most_expensive_first() {
    let app = setup_app();
    let mut db = app.state.open_db().expect("open db");
    db.insert_metrics(&[
        priced_metric("s1", "2025-06-01T10:00:00.000Z", "claude-sonnet-4-20250514", 0.5),
        priced_metric("s2", "2025-06-01T10:05:00.000Z", "claude-sonnet-4-20250514", 0.5),
        priced_metric("o1", "2025-06-01T10:10:00.000Z", "claude-opus-4-20250514", 2.0),
        metric("t1", "2025-06-01T10:20:00.000Z", None),
    ])
    .expect("insert");

    let report = app.state.services.costs.report(None, None).expect("report");
    let models: Vec<_> = report.models.iter().map(|row| row.model.as_str()).collect();
    assert_eq!(
        models,
        vec!["claude-opus-4-20250514", "claude-sonnet-4-20250514", "unknown"]
    );
    assert_eq!(report.total_cost_usd, 3.0);
    assert_eq!(report.total_tokens, 330);
    assert_eq!(report.entry_count, 4);

    let windowed = app
        .state
        .services
        .costs
        .report(Some(at("2025-06-01T10:06:00Z")), None)
        .expect("windowed");
    assert_eq!(windowed.total_cost_usd, 2.0);
}

#[test]
fn export_writes_one_line_per_metric() {
    let app = setup_app();
    let mut db = app.state.open_db().expect("open db");
    db.insert_metrics(&[
        metric("e1", "2025-06-01T10:00:00.000Z", None),
        metric("e2", "2025-06-01T11:00:00.000Z", None),
        metric("e3", "2025-06-02T11:00:00.000Z", None),
    ])
    .expect("insert");

    let now = Utc.with_ymd_and_hms(2025, 6, 3, 8, 0, 0).single().expect("now");
    let summary = app
        .state
        .services
        .export
        .export(
            Some(at("2025-06-01T00:00:00Z")),
            Some(at("2025-06-02T00:00:00Z")),
            ExportFormat::Ndjson,
            now,
        )
        .expect("export");
    assert_eq!(summary.rows, 2);
    assert!(summary.path.starts_with(app.state.config.exports_dir()));
    let content = fs::read_to_string(&summary.path).expect("read export");
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"id\":\"e1\""));

    assert_eq!(ExportFormat::from_str("JSONL").expect("jsonl"), ExportFormat::Jsonl);
    assert!(matches!(
        ExportFormat::from_str("csv"),
        Err(AppError::InvalidInput(_))
    ));
}

#[test]
fn exports_in_the_same_millisecond_keep_both_files() {
    let app = setup_app();
    let mut db = app.state.open_db().expect("open db");
    db.insert_metrics(&[metric("e1", "2025-06-01T10:00:00.000Z", None)])
        .expect("insert");

    let now = Utc.with_ymd_and_hms(2025, 6, 3, 8, 0, 0).single().expect("now");
    let export = &app.state.services.export;
    let first = export
        .export(None, None, ExportFormat::Jsonl, now)
        .expect("first export");
    db.insert_metrics(&[metric("e2", "2025-06-01T11:00:00.000Z", None)])
        .expect("insert");
    let second = export
        .export(None, None, ExportFormat::Jsonl, now)
        .expect("second export");

    assert_ne!(first.path, second.path);
    assert_eq!(fs::read_to_string(&first.path).expect("first").lines().count(), 1);
    assert_eq!(fs::read_to_string(&second.path).expect("second").lines().count(), 2);
    assert_eq!(
        second.path.file_name().and_then(|name| name.to_str()),
        Some("metrics-20250603T080000.000Z-1.jsonl")
    );
}

#[test]
fn archive_moves_old_rows_and_expires_old_files() {
    let app = setup_app_with(|config| {
        config.archive_after_days = 30;
        config.delete_archives_after_days = 90;
    });
    let archive_dir = app.state.config.archive_dir.clone();
    fs::create_dir_all(&archive_dir).expect("archive dir");
    fs::write(archive_dir.join("metrics-2025-01-01.jsonl"), "{}\n").expect("stale archive");
    fs::write(archive_dir.join("metrics-2025-05-01.jsonl"), "{}\n").expect("recent archive");
    fs::write(archive_dir.join("notes.txt"), "keep").expect("unrelated file");

    let mut db = app.state.open_db().expect("open db");
    db.insert_metrics(&[
        metric("old", "2025-04-01T00:00:00.000Z", None),
        metric("new", "2025-05-31T00:00:00.000Z", None),
    ])
    .expect("insert");

    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("now");
    let summary = app.state.services.archive.run(now).expect("archive");
    assert_eq!(summary.archived, 1);
    let archive_file = summary.archive_file.expect("archive file");
    assert_eq!(archive_file, archive_dir.join("metrics-2025-05-02.jsonl"));
    let archived = fs::read_to_string(&archive_file).expect("read archive");
    assert_eq!(archived.lines().count(), 1);
    assert!(archived.contains("\"id\":\"old\""));

    assert_eq!(
        summary.removed_files,
        vec![archive_dir.join("metrics-2025-01-01.jsonl")]
    );
    assert!(archive_dir.join("metrics-2025-05-01.jsonl").exists());
    assert!(archive_dir.join("notes.txt").exists());
    assert_eq!(app.state.services.metrics.count().expect("count"), 1);
}

#[test]
fn plans_are_listed_and_looked_up_by_name() {
    let app = setup_app();
    let config = app.state.config.clone();
    let alpha = config.plans.active_dir.join("alpha");
    let beta = config.plans.complete_dir.join("beta");
    fs::create_dir_all(&alpha).expect("alpha");
    fs::create_dir_all(&beta).expect("beta");
    fs::write(
        alpha.join("manifest.jsonl"),
        concat!(
            r#"{"id":"F1","description":"schema","dependencies":[],"status":"completed"}"#,
            "\n",
            r#"{"id":"F2","description":"api","dependencies":["F1"],"status":"in_progress"}"#,
            "\n",
            r#"{"id":"F3","description":"ui","dependencies":["F2"],"status":"pending"}"#,
            "\n",
        ),
    )
    .expect("manifest");

    let mut db = app.state.open_db().expect("open db");
    db.insert_plan_event(&PlanEvent {
        id: "p1".to_string(),
        timestamp: "2025-06-01T10:00:00.000Z".to_string(),
        session_id: "plan-watcher".to_string(),
        event_type: PlanEventType::FeatureCompleted,
        plan_name: "alpha".to_string(),
        plan_path: alpha.to_string_lossy().to_string(),
        feature_id: Some("F1".to_string()),
        feature_description: Some("schema".to_string()),
        status: Some(TaskStatus::Completed),
        pr_url: None,
        data: Map::new(),
    })
    .expect("plan event");

    let plans = app.state.services.plans.list().expect("list");
    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].name, "alpha");
    assert_eq!(plans[0].state, PlanState::Active);
    assert_eq!(plans[0].counts.total, 3);
    assert_eq!(plans[0].counts.completed, 1);
    assert_eq!(plans[0].counts.in_progress, 1);
    assert_eq!(plans[1].name, "beta");
    assert_eq!(plans[1].state, PlanState::Complete);
    assert_eq!(plans[1].counts.total, 0);

    let detail = app.state.services.plans.get("alpha").expect("alpha");
    assert_eq!(detail.tasks.len(), 3);
    assert_eq!(detail.events.len(), 1);
    assert_eq!(detail.events[0].feature_id.as_deref(), Some("F1"));

    assert!(matches!(
        app.state.services.plans.get("missing"),
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        app.state.services.plans.get("..%2Fsecrets"),
        Err(AppError::Validation(_))
    ));
}
