use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};

/// Parses an optional RFC 3339 query parameter into UTC. Blank values count
/// as absent.
pub fn parse_time_param(value: Option<&str>, field: &str) -> Result<Option<DateTime<Utc>>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|parsed| Some(parsed.with_timezone(&Utc)))
            .map_err(|err| AppError::InvalidInput(format!("invalid {field}: {err}"))),
    }
}
