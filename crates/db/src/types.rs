use chrono::{DateTime, Utc};
use telemetry_core::{AggregateMetric, EventCategory, GroupBy, Period};

pub const DEFAULT_QUERY_LIMIT: u32 = 100;
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Filters for [`crate::Db::query_metrics`]. Every set field narrows the
/// result; `tags` requires all listed tags to be present.
#[derive(Debug, Clone)]
pub struct MetricQuery {
    pub session_id: Option<String>,
    pub event_type: Option<String>,
    pub event_category: Option<EventCategory>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for MetricQuery {
    fn default() -> Self {
        Self {
            session_id: None,
            event_type: None,
            event_category: None,
            start_time: None,
            end_time: None,
            tags: Vec::new(),
            limit: DEFAULT_QUERY_LIMIT,
            offset: 0,
        }
    }
}

/// One aggregation request over the half-open range `[start, end)`.
#[derive(Debug, Clone, Copy)]
pub struct AggregationQuery {
    pub period: Period,
    pub metric: AggregateMetric,
    pub group_by: Option<GroupBy>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
