mod aggregations;
mod error;
mod helpers;
mod metrics;
mod migrations;
mod plans;
mod types;

use std::path::Path;

use rusqlite::Connection;

pub use aggregations::UNKNOWN_GROUP;
pub use error::{DbError, Result};
pub use types::{AggregationQuery, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT, MetricQuery};

/// Handle on the telemetry database. Cheap to open; callers on async paths
/// open one per blocking task.
pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "cache_size", -20_000)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn })
    }
}
