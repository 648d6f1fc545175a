use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::services::{SharedConfig, open_db};
use telemetry_core::{AggregateMetric, AggregationResult, GroupBy, Period};
use telemetry_db::{AggregationQuery, Db};

pub const MAX_AGGREGATION_BUCKETS: u64 = 10_000;

const CACHE_WINDOW_DAYS: i64 = 2;
const CACHED_PERIODS: [Period; 2] = [Period::Hour, Period::Day];
const CACHED_METRICS: [AggregateMetric; 3] = [
    AggregateMetric::Count,
    AggregateMetric::Cost,
    AggregateMetric::Tokens,
];
const CACHED_GROUPS: [Option<GroupBy>; 2] = [None, Some(GroupBy::Model)];

#[derive(Clone)]
pub struct AggregationService {
    config: SharedConfig,
}

impl AggregationService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    pub fn aggregate(
        &self,
        query: &AggregationQuery,
        cached: bool,
    ) -> Result<Vec<AggregationResult>> {
        check_bounds(query)?;
        let db = self.db()?;
        if cached {
            Ok(db.cached_aggregations(query)?)
        } else {
            Ok(db.aggregate(query)?)
        }
    }

    /// Recomputes hourly and daily rollups for the last two days and upserts
    /// them into the aggregation cache.
    pub fn refresh_cache(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut db = self.db()?;
        let mut written = 0;
        for period in CACHED_PERIODS {
            let start = period.floor(now - Duration::days(CACHE_WINDOW_DAYS));
            let end = period.advance(period.floor(now));
            for metric in CACHED_METRICS {
                for group_by in CACHED_GROUPS {
                    let query = AggregationQuery {
                        period,
                        metric,
                        group_by,
                        start,
                        end,
                    };
                    let results = db.aggregate(&query)?;
                    written += db.store_aggregations(&query, &results)?;
                }
            }
        }
        debug!(rows = written, "aggregation cache refreshed");
        Ok(written)
    }
}

pub fn check_bounds(query: &AggregationQuery) -> Result<()> {
    if query.end <= query.start {
        return Err(AppError::InvalidInput(
            "end_time must be after start_time".to_string(),
        ));
    }
    let buckets = query.period.max_buckets(query.start, query.end);
    if buckets > MAX_AGGREGATION_BUCKETS {
        return Err(AppError::InvalidInput(format!(
            "range spans {buckets} {} buckets; the limit is {MAX_AGGREGATION_BUCKETS}",
            query.period.as_str()
        )));
    }
    Ok(())
}
