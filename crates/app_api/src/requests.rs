use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQueryRequest {
    pub session_id: Option<String>,
    pub event_type: Option<String>,
    pub event_category: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub tags: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AggregationsRequest {
    pub period: Option<String>,
    pub metric: Option<String>,
    pub group_by: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub cached: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeRequest {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub format: Option<String>,
}
