use std::str::FromStr;

use rusqlite::Row;
use rusqlite::types::Type;
use serde_json::{Map, Value};
use telemetry_core::{CostBreakdown, MetricEntry, PlanEvent, TokenUsage};

pub(crate) const METRIC_COLUMNS: &str = "id, timestamp, session_id, project_path, source, \
     event_type, event_category, model, tokens, cost, tool_name, tool_duration_ms, \
     tool_success, data, tags";

pub(crate) const PLAN_EVENT_COLUMNS: &str = "id, timestamp, session_id, event_type, plan_name, \
     plan_path, feature_id, feature_description, status, pr_url, data";

fn conversion_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn parse_column<T>(row: &Row<'_>, index: usize) -> Result<T, rusqlite::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(index)?;
    raw.parse::<T>().map_err(|err| conversion_error(index, err))
}

fn json_column<T>(row: &Row<'_>, index: usize) -> Result<Option<T>, rusqlite::Error>
where
    T: serde::de::DeserializeOwned,
{
    let raw: Option<String> = row.get(index)?;
    match raw {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| conversion_error(index, err)),
        None => Ok(None),
    }
}

pub(crate) fn row_to_metric(row: &Row<'_>) -> Result<MetricEntry, rusqlite::Error> {
    Ok(MetricEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        session_id: row.get(2)?,
        project_path: row.get(3)?,
        source: parse_column(row, 4)?,
        event_type: row.get(5)?,
        event_category: parse_column(row, 6)?,
        model: row.get(7)?,
        tokens: json_column::<TokenUsage>(row, 8)?,
        cost: json_column::<CostBreakdown>(row, 9)?,
        tool_name: row.get(10)?,
        tool_duration_ms: row.get::<_, Option<i64>>(11)?.map(|value| value.max(0) as u64),
        tool_success: row.get(12)?,
        data: json_column::<Map<String, Value>>(row, 13)?.unwrap_or_default(),
        tags: json_column::<Vec<String>>(row, 14)?.unwrap_or_default(),
    })
}

pub(crate) fn row_to_plan_event(row: &Row<'_>) -> Result<PlanEvent, rusqlite::Error> {
    let status: Option<String> = row.get(8)?;
    Ok(PlanEvent {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        session_id: row.get(2)?,
        event_type: parse_column(row, 3)?,
        plan_name: row.get(4)?,
        plan_path: row.get(5)?,
        feature_id: row.get(6)?,
        feature_description: row.get(7)?,
        status: status
            .map(|value| value.parse().map_err(|err| conversion_error(8, err)))
            .transpose()?,
        pr_url: row.get(9)?,
        data: json_column::<Map<String, Value>>(row, 10)?.unwrap_or_default(),
    })
}

pub(crate) fn to_json_text<T: serde::Serialize>(
    value: Option<&T>,
) -> Result<Option<String>, serde_json::Error> {
    value.map(serde_json::to_string).transpose()
}
