use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::params;
use telemetry_core::{
    AggregateMetric, AggregationResult, CostBreakdown, GroupBy, TokenUsage, format_timestamp,
    now_timestamp,
};

use crate::Db;
use crate::error::Result;
use crate::types::AggregationQuery;

pub const UNKNOWN_GROUP: &str = "unknown";

struct ScanRow {
    timestamp: String,
    model: Option<String>,
    event_type: String,
    session_id: String,
    tokens: Option<String>,
    cost: Option<String>,
}

impl ScanRow {
    fn group(&self, group_by: GroupBy) -> String {
        let value = match group_by {
            GroupBy::Model => self.model.as_deref(),
            GroupBy::EventType => Some(self.event_type.as_str()),
            GroupBy::Session => Some(self.session_id.as_str()),
        };
        match value {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => UNKNOWN_GROUP.to_string(),
        }
    }

    fn value(&self, metric: AggregateMetric) -> Result<f64> {
        Ok(match metric {
            AggregateMetric::Count => 1.0,
            AggregateMetric::Cost => match &self.cost {
                Some(raw) => serde_json::from_str::<CostBreakdown>(raw)?.total_cost_usd,
                None => 0.0,
            },
            AggregateMetric::Tokens => match &self.tokens {
                Some(raw) => serde_json::from_str::<TokenUsage>(raw)?.total() as f64,
                None => 0.0,
            },
        })
    }
}

impl Db {
    /// Buckets every metric in `[start, end)` by the calendar period and sums
    /// the requested measure. Only buckets (and groups) with at least one row
    /// are returned, ordered by bucket start then group.
    pub fn aggregate(&self, query: &AggregationQuery) -> Result<Vec<AggregationResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT timestamp, model, event_type, session_id, tokens, cost
            FROM metrics
            WHERE timestamp >= ?1 AND timestamp < ?2
            ORDER BY timestamp ASC
            "#,
        )?;
        let rows = stmt.query_map(
            params![format_timestamp(query.start), format_timestamp(query.end)],
            |row| {
                Ok(ScanRow {
                    timestamp: row.get(0)?,
                    model: row.get(1)?,
                    event_type: row.get(2)?,
                    session_id: row.get(3)?,
                    tokens: row.get(4)?,
                    cost: row.get(5)?,
                })
            },
        )?;

        let mut buckets: BTreeMap<(DateTime<Utc>, Option<String>), f64> = BTreeMap::new();
        for row in rows {
            let row = row?;
            let ts = DateTime::parse_from_rfc3339(&row.timestamp)?.with_timezone(&Utc);
            let bucket_start = query.period.floor(ts);
            let group = query.group_by.map(|group_by| row.group(group_by));
            *buckets.entry((bucket_start, group)).or_insert(0.0) += row.value(query.metric)?;
        }

        Ok(buckets
            .into_iter()
            .map(|((bucket_start, group), value)| AggregationResult {
                period_start: format_timestamp(bucket_start),
                period_end: format_timestamp(query.period.advance(bucket_start)),
                value,
                group,
            })
            .collect())
    }

    pub fn store_aggregations(
        &mut self,
        query: &AggregationQuery,
        results: &[AggregationResult],
    ) -> Result<usize> {
        let computed_at = now_timestamp();
        let group_by = query.group_by.map(|group_by| group_by.as_str()).unwrap_or("");
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO aggregations (
                  period_type, period_start, period_end, metric_type, group_by,
                  group_value, value, computed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (period_type, period_start, metric_type, group_by, group_value)
                DO UPDATE SET
                  period_end = excluded.period_end,
                  value = excluded.value,
                  computed_at = excluded.computed_at
                "#,
            )?;
            for result in results {
                stmt.execute(params![
                    query.period.as_str(),
                    result.period_start,
                    result.period_end,
                    query.metric.as_str(),
                    group_by,
                    result.group.as_deref().unwrap_or(""),
                    result.value,
                    computed_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(results.len())
    }

    pub fn cached_aggregations(&self, query: &AggregationQuery) -> Result<Vec<AggregationResult>> {
        let group_by = query.group_by.map(|group_by| group_by.as_str()).unwrap_or("");
        let mut stmt = self.conn.prepare(
            r#"
            SELECT period_start, period_end, value, group_value
            FROM aggregations
            WHERE period_type = ?1 AND metric_type = ?2 AND group_by = ?3
              AND period_start >= ?4 AND period_start < ?5
            ORDER BY period_start ASC, group_value ASC
            "#,
        )?;
        let rows = stmt.query_map(
            params![
                query.period.as_str(),
                query.metric.as_str(),
                group_by,
                format_timestamp(query.period.floor(query.start)),
                format_timestamp(query.end),
            ],
            |row| {
                let group_value: String = row.get(3)?;
                Ok(AggregationResult {
                    period_start: row.get(0)?,
                    period_end: row.get(1)?,
                    value: row.get(2)?,
                    group: if query.group_by.is_some() {
                        Some(group_value)
                    } else {
                        None
                    },
                })
            },
        )?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
