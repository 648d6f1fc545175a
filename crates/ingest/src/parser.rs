use std::fmt::Write;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use telemetry_core::{
    EventCategory, MetricEntry, MetricSource, TokenUsage, calculate_cost, now_timestamp,
    validate_session_id,
};

pub const TRANSCRIPT_EVENT_TYPE: &str = "api_usage";
const UNKNOWN_SESSION: &str = "unknown";

#[derive(Debug)]
pub enum LineOutcome {
    Metric(Box<MetricEntry>),
    /// Valid JSON without a usage payload (user turns, summaries, ...).
    NoUsage,
    Malformed(String),
}

fn find_value<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    for path in paths {
        let mut current = value;
        let mut ok = true;
        for key in *path {
            if let Some(next) = current.get(*key) {
                current = next;
            } else {
                ok = false;
                break;
            }
        }
        if ok && !current.is_null() {
            return Some(current);
        }
    }
    None
}

fn find_string<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    find_value(value, paths).and_then(Value::as_str)
}

pub(crate) fn normalize_timestamp(raw: &str) -> Option<String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(
            parsed
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        let dt = DateTime::<Utc>::from_naive_utc_and_offset(parsed, Utc);
        return Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    if raw.chars().all(|ch| ch.is_ascii_digit())
        && let Ok(value) = raw.parse::<i64>()
    {
        let (secs, nanos) = if raw.len() > 10 {
            (
                value / 1000,
                (value % 1000).unsigned_abs() as u32 * 1_000_000,
            )
        } else {
            (value, 0)
        };
        if let Some(dt) = DateTime::<Utc>::from_timestamp(secs, nanos) {
            return Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
    }
    None
}

fn parse_usage(value: &Value) -> Option<TokenUsage> {
    let usage = find_value(value, &[&["message", "usage"], &["usage"]])?;
    if !usage.is_object() {
        return None;
    }
    let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
    let tokens = TokenUsage {
        input_tokens: field("input_tokens"),
        output_tokens: field("output_tokens"),
        cache_read_input_tokens: field("cache_read_input_tokens"),
        cache_creation_input_tokens: field("cache_creation_input_tokens"),
    };
    if tokens.total() == 0 && usage.get("input_tokens").is_none() {
        return None;
    }
    Some(tokens)
}

fn tool_names(value: &Value) -> Vec<String> {
    let Some(content) = find_value(value, &[&["message", "content"]]).and_then(Value::as_array)
    else {
        return Vec::new();
    };
    content
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
        .filter_map(|block| block.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn session_id_for(value: &Value, file_path: &str) -> String {
    if let Some(raw) = find_string(value, &[&["sessionId"], &["session_id"]])
        && validate_session_id(raw).is_ok()
    {
        return raw.to_string();
    }
    Path::new(file_path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| validate_session_id(stem).is_ok())
        .unwrap_or(UNKNOWN_SESSION)
        .to_string()
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut out, "{:02x}", byte);
    }
    out
}

pub fn transcript_metric_id(file_path: &str, line_index: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b":");
    hasher.update(line_index.to_string().as_bytes());
    hex_digest(&hasher.finalize())
}

pub fn parse_transcript_line(line: &str, file_path: &str, line_index: u64) -> LineOutcome {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => return LineOutcome::Malformed(err.to_string()),
    };
    let Some(tokens) = parse_usage(&value) else {
        return LineOutcome::NoUsage;
    };

    let model = find_string(&value, &[&["message", "model"], &["model"]]).map(str::to_string);
    let cost = model.as_deref().map(|model| calculate_cost(&tokens, model));
    let timestamp = find_string(&value, &[&["timestamp"]])
        .and_then(normalize_timestamp)
        .unwrap_or_else(now_timestamp);
    let tools = tool_names(&value);

    let mut data = Map::new();
    data.insert("transcript_path".to_string(), Value::from(file_path));
    data.insert("line_index".to_string(), Value::from(line_index));
    if let Some(message_id) = find_string(&value, &[&["message", "id"]]) {
        data.insert("message_id".to_string(), Value::from(message_id));
    }
    if let Some(request_id) = find_string(&value, &[&["requestId"], &["request_id"]]) {
        data.insert("request_id".to_string(), Value::from(request_id));
    }
    if !tools.is_empty() {
        data.insert(
            "tool_names".to_string(),
            Value::Array(tools.iter().cloned().map(Value::from).collect()),
        );
    }

    LineOutcome::Metric(Box::new(MetricEntry {
        id: transcript_metric_id(file_path, line_index),
        timestamp,
        session_id: session_id_for(&value, file_path),
        project_path: find_string(&value, &[&["cwd"], &["project_path"]])
            .unwrap_or_default()
            .to_string(),
        source: MetricSource::Transcript,
        event_type: TRANSCRIPT_EVENT_TYPE.to_string(),
        event_category: EventCategory::Api,
        model,
        tokens: Some(tokens),
        cost,
        tool_name: tools.into_iter().next(),
        tool_duration_ms: None,
        tool_success: None,
        data,
        tags: Vec::new(),
    }))
}
