use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    CostBreakdown, EventCategory, MetricEntry, MetricSource, TokenUsage, calculate_cost,
    format_timestamp, new_event_id, now_timestamp,
};

pub const MAX_SESSION_ID_LEN: usize = 64;
pub const MAX_PLAN_NAME_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} contains invalid character {character:?}")]
    InvalidCharacter { field: &'static str, character: char },
    #[error("{field} contains a path traversal sequence")]
    Traversal { field: &'static str },
    #[error("{field} contains a null byte")]
    NullByte { field: &'static str },
    #[error("{field} is not valid percent-encoded UTF-8")]
    Decode { field: &'static str },
    #[error("path escapes its base directory")]
    OutsideBase,
    #[error("unsupported {field} {value}")]
    UnknownVariant { field: &'static str, value: String },
    #[error("invalid timestamp {0}")]
    Timestamp(String),
    #[error("invalid metric entry: {0}")]
    Schema(String),
}

fn percent_decode(raw: &str, field: &'static str) -> Result<String, ValidationError> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ValidationError::Decode { field })
}

/// Decodes one path component and rejects anything that could address
/// another directory.
pub fn sanitize_path_component(raw: &str) -> Result<String, ValidationError> {
    const FIELD: &str = "path component";
    let decoded = percent_decode(raw, FIELD)?;
    if decoded.trim().is_empty() {
        return Err(ValidationError::Empty { field: FIELD });
    }
    if decoded.contains('\0') {
        return Err(ValidationError::NullByte { field: FIELD });
    }
    if decoded.contains("..") {
        return Err(ValidationError::Traversal { field: FIELD });
    }
    if let Some(character) = decoded.chars().find(|ch| *ch == '/' || *ch == '\\') {
        return Err(ValidationError::InvalidCharacter {
            field: FIELD,
            character,
        });
    }
    Ok(decoded)
}

/// Joins `relative` onto `base` and checks that the lexically normalised
/// result stays under `base`. The filesystem is not consulted.
pub fn validate_path_within_base(base: &Path, relative: &str) -> Result<PathBuf, ValidationError> {
    if relative.contains('\0') {
        return Err(ValidationError::NullByte { field: "path" });
    }
    let base = normalize(base);
    let joined = normalize(&base.join(relative));
    if joined.starts_with(&base) {
        Ok(joined)
    } else {
        Err(ValidationError::OutsideBase)
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn validate_session_id(raw: &str) -> Result<&str, ValidationError> {
    const FIELD: &str = "session_id";
    if raw.is_empty() {
        return Err(ValidationError::Empty { field: FIELD });
    }
    if raw.len() > MAX_SESSION_ID_LEN {
        return Err(ValidationError::TooLong {
            field: FIELD,
            max: MAX_SESSION_ID_LEN,
        });
    }
    if let Some(character) = raw
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '-'))
    {
        return Err(ValidationError::InvalidCharacter {
            field: FIELD,
            character,
        });
    }
    Ok(raw)
}

pub fn validate_plan_name(raw: &str) -> Result<String, ValidationError> {
    const FIELD: &str = "plan name";
    let decoded = percent_decode(raw, FIELD)?;
    if decoded.is_empty() {
        return Err(ValidationError::Empty { field: FIELD });
    }
    if decoded.contains('\0') {
        return Err(ValidationError::NullByte { field: FIELD });
    }
    if decoded.chars().count() > MAX_PLAN_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: FIELD,
            max: MAX_PLAN_NAME_LEN,
        });
    }
    if let Some(character) = decoded
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-'))
    {
        return Err(ValidationError::InvalidCharacter {
            field: FIELD,
            character,
        });
    }
    Ok(decoded)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetricEntryInput {
    id: Option<String>,
    timestamp: Option<String>,
    session_id: String,
    #[serde(default)]
    project_path: String,
    source: MetricSource,
    event_type: String,
    event_category: EventCategory,
    model: Option<String>,
    tokens: Option<TokenUsage>,
    cost: Option<CostBreakdown>,
    tool_name: Option<String>,
    tool_duration_ms: Option<u64>,
    tool_success: Option<bool>,
    #[serde(default)]
    data: Map<String, Value>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Schema check for metric records arriving from outside the process.
/// Fills in a generated id and the current time when absent, normalises the
/// timestamp to UTC and prices token usage when no cost was supplied.
pub fn validate_metric_entry(value: Value) -> Result<MetricEntry, ValidationError> {
    let input: MetricEntryInput =
        serde_json::from_value(value).map_err(|err| ValidationError::Schema(err.to_string()))?;
    validate_session_id(&input.session_id)?;
    if input.event_type.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: "event_type",
        });
    }
    let timestamp = match input.timestamp {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| format_timestamp(parsed.with_timezone(&Utc)))
            .map_err(|_| ValidationError::Timestamp(raw))?,
        None => now_timestamp(),
    };
    let id = match input.id {
        Some(id) if id.trim().is_empty() => return Err(ValidationError::Empty { field: "id" }),
        Some(id) => id,
        None => new_event_id(),
    };
    if input.cost.as_ref().is_some_and(|cost| !cost.is_consistent()) {
        return Err(ValidationError::Schema(
            "cost.total_cost_usd does not equal the sum of its components".to_string(),
        ));
    }
    let cost = match (input.cost, input.tokens.as_ref(), input.model.as_deref()) {
        (Some(cost), _, _) => Some(cost),
        (None, Some(tokens), Some(model)) => Some(calculate_cost(tokens, model)),
        (None, _, _) => None,
    };
    Ok(MetricEntry {
        id,
        timestamp,
        session_id: input.session_id,
        project_path: input.project_path,
        source: input.source,
        event_type: input.event_type,
        event_category: input.event_category,
        model: input.model,
        tokens: input.tokens,
        cost,
        tool_name: input.tool_name,
        tool_duration_ms: input.tool_duration_ms,
        tool_success: input.tool_success,
        data: input.data,
        tags: input.tags,
    })
}
