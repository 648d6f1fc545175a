use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Statement, params, params_from_iter};
use telemetry_core::{MetricEntry, ModelCost, format_timestamp, now_timestamp};

use crate::Db;
use crate::error::Result;
use crate::helpers::{METRIC_COLUMNS, row_to_metric, to_json_text};
use crate::types::{MAX_QUERY_LIMIT, MetricQuery};

const INSERT_METRIC: &str = r#"
    INSERT OR IGNORE INTO metrics (
      id, timestamp, session_id, project_path, source, event_type, event_category,
      model, tokens, cost, tool_name, tool_duration_ms, tool_success, data, tags, created_at
    ) VALUES (
      ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16
    )
"#;

fn insert_with(stmt: &mut Statement<'_>, entry: &MetricEntry, created_at: &str) -> Result<bool> {
    let rows = stmt.execute(params![
        entry.id,
        entry.timestamp,
        entry.session_id,
        entry.project_path,
        entry.source.as_str(),
        entry.event_type,
        entry.event_category.as_str(),
        entry.model,
        to_json_text(entry.tokens.as_ref())?,
        to_json_text(entry.cost.as_ref())?,
        entry.tool_name,
        entry.tool_duration_ms.map(|value| value as i64),
        entry.tool_success,
        serde_json::to_string(&entry.data)?,
        serde_json::to_string(&entry.tags)?,
        created_at,
    ])?;
    Ok(rows > 0)
}

impl Db {
    pub fn insert_metric(&mut self, entry: &MetricEntry) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(INSERT_METRIC)?;
        insert_with(&mut stmt, entry, &now_timestamp())
    }

    pub fn insert_metrics(&mut self, entries: &[MetricEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let created_at = now_timestamp();
        let tx = self.conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(INSERT_METRIC)?;
            for entry in entries {
                if insert_with(&mut stmt, entry, &created_at)? {
                    inserted += 1;
                }
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn query_metrics(&self, query: &MetricQuery) -> Result<Vec<MetricEntry>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if let Some(session_id) = &query.session_id {
            clauses.push("session_id = ?");
            values.push(SqlValue::Text(session_id.clone()));
        }
        if let Some(event_type) = &query.event_type {
            clauses.push("event_type = ?");
            values.push(SqlValue::Text(event_type.clone()));
        }
        if let Some(category) = query.event_category {
            clauses.push("event_category = ?");
            values.push(SqlValue::Text(category.as_str().to_string()));
        }
        if let Some(start) = query.start_time {
            clauses.push("timestamp >= ?");
            values.push(SqlValue::Text(format_timestamp(start)));
        }
        if let Some(end) = query.end_time {
            clauses.push("timestamp < ?");
            values.push(SqlValue::Text(format_timestamp(end)));
        }
        for tag in &query.tags {
            clauses.push("EXISTS (SELECT 1 FROM json_each(metrics.tags) WHERE json_each.value = ?)");
            values.push(SqlValue::Text(tag.clone()));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        values.push(SqlValue::Integer(query.limit.min(MAX_QUERY_LIMIT) as i64));
        values.push(SqlValue::Integer(query.offset as i64));
        let sql = format!(
            "SELECT {METRIC_COLUMNS} FROM metrics {where_clause} \
             ORDER BY timestamp DESC, id ASC LIMIT ? OFFSET ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_metric)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Oldest first, unpaginated. Used for exports and archiving.
    pub fn metrics_in_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetricEntry>> {
        let start = start.map(format_timestamp).unwrap_or_default();
        let end = end.map(format_timestamp);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {METRIC_COLUMNS} FROM metrics \
             WHERE timestamp >= ?1 AND (?2 IS NULL OR timestamp < ?2) \
             ORDER BY timestamp ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![start, end], row_to_metric)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn delete_metrics_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM metrics WHERE timestamp < ?1",
            [format_timestamp(cutoff)],
        )?;
        Ok(deleted)
    }

    pub fn count_metrics(&self) -> Result<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM metrics")
    }

    /// Per-model totals, most expensive first. Rows without a model are
    /// reported under `unknown`.
    pub fn cost_by_model(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ModelCost>> {
        let start = start.map(format_timestamp).unwrap_or_default();
        let end = end.map(format_timestamp);
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
              COALESCE(NULLIF(model, ''), 'unknown') AS model_name,
              COALESCE(SUM(json_extract(cost, '$.total_cost_usd')), 0.0),
              COALESCE(SUM(
                COALESCE(json_extract(tokens, '$.input_tokens'), 0)
                + COALESCE(json_extract(tokens, '$.output_tokens'), 0)
                + COALESCE(json_extract(tokens, '$.cache_read_input_tokens'), 0)
                + COALESCE(json_extract(tokens, '$.cache_creation_input_tokens'), 0)
              ), 0),
              COUNT(*)
            FROM metrics
            WHERE timestamp >= ?1 AND (?2 IS NULL OR timestamp < ?2)
            GROUP BY model_name
            ORDER BY 2 DESC, model_name ASC
            "#,
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            Ok(ModelCost {
                model: row.get(0)?,
                total_cost_usd: row.get(1)?,
                total_tokens: row.get::<_, i64>(2)?.max(0) as u64,
                entry_count: row.get::<_, i64>(3)?.max(0) as u64,
            })
        })?;
        let mut costs = Vec::new();
        for row in rows {
            costs.push(row?);
        }
        Ok(costs)
    }
}

pub(crate) fn count(conn: &Connection, sql: &str) -> Result<u64> {
    let value: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(value.max(0) as u64)
}
