use rusqlite::params;
use telemetry_core::PlanEvent;

use crate::Db;
use crate::error::Result;
use crate::helpers::{PLAN_EVENT_COLUMNS, row_to_plan_event};

impl Db {
    pub fn insert_plan_event(&mut self, event: &PlanEvent) -> Result<bool> {
        let rows = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO plan_events (
              id, timestamp, session_id, event_type, plan_name, plan_path,
              feature_id, feature_description, status, pr_url, data
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                event.id,
                event.timestamp,
                event.session_id,
                event.event_type.as_str(),
                event.plan_name,
                event.plan_path,
                event.feature_id,
                event.feature_description,
                event.status.map(|status| status.as_str()),
                event.pr_url,
                serde_json::to_string(&event.data)?,
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn plan_events(&self, plan_name: &str, limit: u32) -> Result<Vec<PlanEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAN_EVENT_COLUMNS} FROM plan_events \
             WHERE plan_name = ?1 ORDER BY timestamp ASC, id ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![plan_name, limit as i64], row_to_plan_event)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    pub fn recent_plan_events(&self, limit: u32) -> Result<Vec<PlanEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAN_EVENT_COLUMNS} FROM plan_events \
             ORDER BY timestamp DESC, id ASC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit as i64], row_to_plan_event)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}
