mod support;

use support::{make_api_metric, make_metric, setup_db, tokens, ts};
use telemetry_core::{AggregateMetric, GroupBy, Period};
use telemetry_db::AggregationQuery;

fn query(
    period: Period,
    metric: AggregateMetric,
    group_by: Option<GroupBy>,
    start: &str,
    end: &str,
) -> AggregationQuery {
    AggregationQuery {
        period,
        metric,
        group_by,
        start: ts(start),
        end: ts(end),
    }
}

#[test]
fn hourly_counts_are_sparse_and_bucketed() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    db.insert_metrics(&[
        make_metric("a", "2025-01-01T10:15:00.000Z", "session-a"),
        make_metric("b", "2025-01-01T10:45:00.000Z", "session-a"),
        make_metric("c", "2025-01-01T11:30:00.000Z", "session-a"),
        make_metric("outside", "2025-01-01T12:00:00.000Z", "session-a"),
    ])
    .expect("insert");

    let results = db
        .aggregate(&query(
            Period::Hour,
            AggregateMetric::Count,
            None,
            "2025-01-01T10:00:00Z",
            "2025-01-01T12:00:00Z",
        ))
        .expect("aggregate");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].period_start, "2025-01-01T10:00:00.000Z");
    assert_eq!(results[0].period_end, "2025-01-01T11:00:00.000Z");
    assert_eq!(results[0].value, 2.0);
    assert_eq!(results[1].period_start, "2025-01-01T11:00:00.000Z");
    assert_eq!(results[1].period_end, "2025-01-01T12:00:00.000Z");
    assert_eq!(results[1].value, 1.0);
    assert!(results.iter().all(|result| result.group.is_none()));

    let empty = db
        .aggregate(&query(
            Period::Hour,
            AggregateMetric::Count,
            None,
            "2025-01-02T00:00:00Z",
            "2025-01-03T00:00:00Z",
        ))
        .expect("aggregate empty");
    assert!(empty.is_empty());
}

#[test]
fn hourly_sums_match_daily_bucket_per_group() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    let mut entries = Vec::new();
    for hour in 0..24u32 {
        for minute in [5u32, 35] {
            if (hour + minute) % 3 == 0 {
                continue;
            }
            let model = if hour % 2 == 0 {
                "claude-sonnet-4-20250514"
            } else {
                "claude-3-5-haiku-20241022"
            };
            entries.push(make_api_metric(
                &format!("m-{hour}-{minute}"),
                &format!("2025-02-03T{hour:02}:{minute:02}:00.000Z"),
                model,
                tokens(100 + hour as u64, 7),
            ));
        }
    }
    db.insert_metrics(&entries).expect("insert");

    for metric in [AggregateMetric::Count, AggregateMetric::Tokens] {
        let hourly = db
            .aggregate(&query(
                Period::Hour,
                metric,
                Some(GroupBy::Model),
                "2025-02-03T00:00:00Z",
                "2025-02-04T00:00:00Z",
            ))
            .expect("hourly");
        let daily = db
            .aggregate(&query(
                Period::Day,
                metric,
                Some(GroupBy::Model),
                "2025-02-03T00:00:00Z",
                "2025-02-04T00:00:00Z",
            ))
            .expect("daily");
        assert_eq!(daily.len(), 2);
        for day in &daily {
            let summed: f64 = hourly
                .iter()
                .filter(|hour| hour.group == day.group)
                .map(|hour| hour.value)
                .sum();
            assert_eq!(summed, day.value, "{metric:?} {:?}", day.group);
        }
    }
}

#[test]
fn grouping_labels_missing_models_unknown() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    db.insert_metrics(&[
        make_metric("tool", "2025-01-01T10:00:00.000Z", "session-a"),
        make_api_metric(
            "api",
            "2025-01-01T10:10:00.000Z",
            "claude-opus-4-20250514",
            tokens(1_000_000, 0),
        ),
    ])
    .expect("insert");

    let results = db
        .aggregate(&query(
            Period::Day,
            AggregateMetric::Cost,
            Some(GroupBy::Model),
            "2025-01-01T00:00:00Z",
            "2025-01-02T00:00:00Z",
        ))
        .expect("aggregate");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].group.as_deref(), Some("claude-opus-4-20250514"));
    assert!((results[0].value - 15.0).abs() < 1e-9);
    assert_eq!(results[1].group.as_deref(), Some("unknown"));
    assert_eq!(results[1].value, 0.0);

    let by_session = db
        .aggregate(&query(
            Period::Week,
            AggregateMetric::Count,
            Some(GroupBy::Session),
            "2025-01-01T00:00:00Z",
            "2025-01-02T00:00:00Z",
        ))
        .expect("by session");
    // 2025-01-01 is a Wednesday; the week bucket starts the Monday before.
    assert_eq!(by_session[0].period_start, "2024-12-30T00:00:00.000Z");
    assert_eq!(by_session[0].period_end, "2025-01-06T00:00:00.000Z");
}

#[test]
fn stored_aggregations_upsert_by_key() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    db.insert_metrics(&[
        make_metric("a", "2025-01-01T10:15:00.000Z", "session-a"),
        make_metric("b", "2025-01-01T11:15:00.000Z", "session-a"),
    ])
    .expect("insert");
    let hourly = query(
        Period::Hour,
        AggregateMetric::Count,
        None,
        "2025-01-01T00:00:00Z",
        "2025-01-02T00:00:00Z",
    );

    let results = db.aggregate(&hourly).expect("aggregate");
    assert_eq!(db.store_aggregations(&hourly, &results).expect("store"), 2);
    db.insert_metric(&make_metric("c", "2025-01-01T10:30:00.000Z", "session-a"))
        .expect("insert late metric");
    let refreshed = db.aggregate(&hourly).expect("aggregate again");
    db.store_aggregations(&hourly, &refreshed).expect("store again");

    let cached = db.cached_aggregations(&hourly).expect("cached");
    assert_eq!(cached, refreshed);
    assert_eq!(cached[0].value, 2.0);

    let by_model = AggregationQuery {
        group_by: Some(GroupBy::Model),
        ..hourly
    };
    assert!(db.cached_aggregations(&by_model).expect("other key").is_empty());
}
