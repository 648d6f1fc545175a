use serde::Serialize;
use telemetry_app::PlanSummary;
use telemetry_core::{AggregationResult, MetricEntry};

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub metrics: Vec<MetricEntry>,
    pub count: usize,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Serialize)]
pub struct AggregationsResponse {
    pub period: String,
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub cached: bool,
    pub results: Vec<AggregationResult>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub id: String,
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<PlanSummary>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub buffered_metrics: usize,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}
