use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use telemetry_app::{
    AppError, CostReport, ExportFormat, ExportSummary, PlanDetail, Result, parse_time_param,
};
use telemetry_core::{
    AggregateMetric, EventCategory, GroupBy, MetricEntry, Period, PlanEvent, ValidationError,
    format_timestamp, validate_session_id,
};
use telemetry_db::{AggregationQuery, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT, MetricQuery};

use crate::{
    AggregationsRequest, AggregationsResponse, AppContext, ExportRequest, HealthResponse,
    IngestResponse, MetricsQueryRequest, MetricsResponse, PlansResponse, RangeRequest,
};

/// Aggregations without explicit bounds cover this many days up to now.
pub const DEFAULT_AGGREGATION_DAYS: i64 = 7;
pub const SNAPSHOT_LIMIT: u32 = 50;

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_required<T>(value: Option<String>, field: &str) -> Result<T>
where
    T: FromStr<Err = ValidationError>,
{
    let raw = non_empty(value)
        .ok_or_else(|| AppError::InvalidInput(format!("{field} is required")))?;
    Ok(T::from_str(&raw)?)
}

fn parse_optional<T>(value: Option<String>) -> Result<Option<T>>
where
    T: FromStr<Err = ValidationError>,
{
    match non_empty(value) {
        Some(raw) => Ok(Some(T::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn parse_tags(raw: Option<String>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn time_bounds(
    start: Option<String>,
    end: Option<String>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let start = parse_time_param(start.as_deref(), "start_time")?;
    let end = parse_time_param(end.as_deref(), "end_time")?;
    if let (Some(start), Some(end)) = (start, end)
        && end < start
    {
        return Err(AppError::InvalidInput(
            "end_time must not be before start_time".to_string(),
        ));
    }
    Ok((start, end))
}

pub fn query_metrics(ctx: &AppContext, req: MetricsQueryRequest) -> Result<MetricsResponse> {
    let session_id = match non_empty(req.session_id) {
        Some(raw) => Some(validate_session_id(&raw)?.to_string()),
        None => None,
    };
    let (start_time, end_time) = time_bounds(req.start_time, req.end_time)?;
    let limit = req
        .limit
        .unwrap_or(DEFAULT_QUERY_LIMIT)
        .clamp(1, MAX_QUERY_LIMIT);
    let offset = req.offset.unwrap_or(0);
    let query = MetricQuery {
        session_id,
        event_type: non_empty(req.event_type),
        event_category: parse_optional::<EventCategory>(req.event_category)?,
        start_time,
        end_time,
        tags: parse_tags(req.tags),
        limit,
        offset,
    };
    let metrics = ctx.app_state.services.metrics.query(&query)?;
    Ok(MetricsResponse {
        count: metrics.len(),
        metrics,
        limit,
        offset,
    })
}

pub fn aggregations(ctx: &AppContext, req: AggregationsRequest) -> Result<AggregationsResponse> {
    aggregations_at(ctx, req, Utc::now())
}

pub fn aggregations_at(
    ctx: &AppContext,
    req: AggregationsRequest,
    now: DateTime<Utc>,
) -> Result<AggregationsResponse> {
    let period: Period = parse_required(req.period, "period")?;
    let metric: AggregateMetric = parse_required(req.metric, "metric")?;
    let group_by: Option<GroupBy> = parse_optional(req.group_by)?;
    let (start, end) = time_bounds(req.start_time, req.end_time)?;
    let end = end.unwrap_or(now);
    let start = start.unwrap_or(end - Duration::days(DEFAULT_AGGREGATION_DAYS));
    let cached = req.cached.unwrap_or(false);
    let query = AggregationQuery {
        period,
        metric,
        group_by,
        start,
        end,
    };
    let results = ctx.app_state.services.aggregation.aggregate(&query, cached)?;
    Ok(AggregationsResponse {
        period: period.as_str().to_string(),
        metric: metric.as_str().to_string(),
        group_by: group_by.map(|group_by| group_by.as_str().to_string()),
        start_time: format_timestamp(start),
        end_time: format_timestamp(end),
        cached,
        results,
    })
}

pub fn costs(ctx: &AppContext, req: RangeRequest) -> Result<CostReport> {
    let (start, end) = time_bounds(req.start_time, req.end_time)?;
    ctx.app_state.services.costs.report(start, end)
}

pub fn export_metrics(ctx: &AppContext, req: ExportRequest) -> Result<ExportSummary> {
    let format = match non_empty(req.format) {
        Some(raw) => ExportFormat::from_str(&raw)?,
        None => ExportFormat::default(),
    };
    let (start, end) = time_bounds(req.start_time, req.end_time)?;
    ctx.app_state
        .services
        .export
        .export(start, end, format, Utc::now())
}

pub fn list_plans(ctx: &AppContext) -> Result<PlansResponse> {
    Ok(PlansResponse {
        plans: ctx.app_state.services.plans.list()?,
    })
}

pub fn get_plan(ctx: &AppContext, name: &str) -> Result<PlanDetail> {
    ctx.app_state.services.plans.get(name)
}

pub async fn ingest_metric(ctx: &AppContext, body: Value) -> Result<IngestResponse> {
    let entry = ctx.app_state.ingest_metric(body).await?;
    Ok(IngestResponse {
        id: entry.id,
        accepted: true,
    })
}

/// Most recent metrics, oldest first, for a new stream subscriber.
pub fn metrics_snapshot(ctx: &AppContext) -> Result<Vec<MetricEntry>> {
    let mut metrics = ctx.app_state.services.metrics.query(&MetricQuery {
        limit: SNAPSHOT_LIMIT,
        ..MetricQuery::default()
    })?;
    metrics.reverse();
    Ok(metrics)
}

pub fn plans_snapshot(ctx: &AppContext) -> Result<Vec<PlanEvent>> {
    let mut events = ctx.app_state.services.plans.recent_events(SNAPSHOT_LIMIT)?;
    events.reverse();
    Ok(events)
}

pub fn health(ctx: &AppContext) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: ctx.started_at.elapsed().as_secs(),
        buffered_metrics: ctx.app_state.collector.buffered(),
    }
}
