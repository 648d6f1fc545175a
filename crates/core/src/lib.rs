mod period;
mod pricing;
mod validation;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use period::{AggregateMetric, GroupBy, Period};
pub use pricing::{
    KNOWN_MODEL_PRICING, ModelPricing, PricingLookup, PricingTier, calculate_cost,
    get_model_pricing,
};
pub use validation::{
    MAX_PLAN_NAME_LEN, MAX_SESSION_ID_LEN, ValidationError, sanitize_path_component,
    validate_metric_entry, validate_path_within_base, validate_plan_name, validate_session_id,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    Hook,
    Transcript,
    Telemetry,
    Custom,
}

impl MetricSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hook => "hook",
            Self::Transcript => "transcript",
            Self::Telemetry => "telemetry",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for MetricSource {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "hook" => Ok(Self::Hook),
            "transcript" => Ok(Self::Transcript),
            "telemetry" => Ok(Self::Telemetry),
            "custom" => Ok(Self::Custom),
            other => Err(ValidationError::UnknownVariant {
                field: "source",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for MetricSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Tool,
    Api,
    Session,
    User,
    Custom,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Api => "api",
            Self::Session => "session",
            Self::User => "user",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for EventCategory {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "tool" => Ok(Self::Tool),
            "api" => Ok(Self::Api),
            "session" => Ok(Self::Session),
            "user" => Ok(Self::User),
            "custom" => Ok(Self::Custom),
            other => Err(ValidationError::UnknownVariant {
                field: "event_category",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_read_input_tokens)
            .saturating_add(self.cache_creation_input_tokens)
    }

    pub fn scaled(&self, factor: u64) -> Self {
        Self {
            input_tokens: self.input_tokens.saturating_mul(factor),
            output_tokens: self.output_tokens.saturating_mul(factor),
            cache_read_input_tokens: self.cache_read_input_tokens.saturating_mul(factor),
            cache_creation_input_tokens: self.cache_creation_input_tokens.saturating_mul(factor),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub cache_read_cost_usd: f64,
    pub cache_creation_cost_usd: f64,
    pub total_cost_usd: f64,
}

impl CostBreakdown {
    pub fn from_components(input: f64, output: f64, cache_read: f64, cache_creation: f64) -> Self {
        Self {
            input_cost_usd: input,
            output_cost_usd: output,
            cache_read_cost_usd: cache_read,
            cache_creation_cost_usd: cache_creation,
            total_cost_usd: input + output + cache_read + cache_creation,
        }
    }

    pub fn is_consistent(&self) -> bool {
        let sum = self.input_cost_usd
            + self.output_cost_usd
            + self.cache_read_cost_usd
            + self.cache_creation_cost_usd;
        (sum - self.total_cost_usd).abs() <= 1e-9 * sum.abs().max(1.0)
    }
}

/// One observed event. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub id: String,
    pub timestamp: String,
    pub session_id: String,
    pub project_path: String,
    pub source: MetricSource,
    pub event_type: String,
    pub event_category: EventCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_success: Option<bool>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanEventType {
    PlanCreated,
    PlanOptimized,
    FeatureCreated,
    OrchestrationStarted,
    FeatureStarted,
    FeatureCompleted,
    FeatureFailed,
    OrchestrationCompleted,
    PrCreated,
}

impl PlanEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanCreated => "plan_created",
            Self::PlanOptimized => "plan_optimized",
            Self::FeatureCreated => "feature_created",
            Self::OrchestrationStarted => "orchestration_started",
            Self::FeatureStarted => "feature_started",
            Self::FeatureCompleted => "feature_completed",
            Self::FeatureFailed => "feature_failed",
            Self::OrchestrationCompleted => "orchestration_completed",
            Self::PrCreated => "pr_created",
        }
    }
}

impl FromStr for PlanEventType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "plan_created" => Ok(Self::PlanCreated),
            "plan_optimized" => Ok(Self::PlanOptimized),
            "feature_created" => Ok(Self::FeatureCreated),
            "orchestration_started" => Ok(Self::OrchestrationStarted),
            "feature_started" => Ok(Self::FeatureStarted),
            "feature_completed" => Ok(Self::FeatureCompleted),
            "feature_failed" => Ok(Self::FeatureFailed),
            "orchestration_completed" => Ok(Self::OrchestrationCompleted),
            "pr_created" => Ok(Self::PrCreated),
            other => Err(ValidationError::UnknownVariant {
                field: "event_type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn transition_event(&self) -> Option<PlanEventType> {
        match self {
            Self::Pending => None,
            Self::InProgress => Some(PlanEventType::FeatureStarted),
            Self::Completed => Some(PlanEventType::FeatureCompleted),
            Self::Failed => Some(PlanEventType::FeatureFailed),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ValidationError::UnknownVariant {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEvent {
    pub id: String,
    pub timestamp: String,
    pub session_id: String,
    pub event_type: PlanEventType,
    pub plan_name: String,
    pub plan_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub period_start: String,
    pub period_end: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCost {
    pub model: String,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub entry_count: u64,
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_total_sums_all_classes() {
        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 20,
            cache_read_input_tokens: 30,
            cache_creation_input_tokens: 40,
        };
        assert_eq!(usage.total(), 100);
        assert_eq!(usage.scaled(2).total(), 200);
    }

    #[test]
    fn cost_breakdown_total_matches_components() {
        let cost = CostBreakdown::from_components(0.1, 0.2, 0.3, 0.4);
        assert!((cost.total_cost_usd - 1.0).abs() < 1e-12);
        assert!(cost.is_consistent());

        let broken = CostBreakdown {
            total_cost_usd: 5.0,
            ..cost
        };
        assert!(!broken.is_consistent());
    }

    #[test]
    fn metric_entry_defaults_data_and_tags() {
        let json = r#"{
            "id": "m1",
            "timestamp": "2025-01-01T10:00:00.000Z",
            "session_id": "s1",
            "project_path": "/tmp/project",
            "source": "hook",
            "event_type": "tool_use",
            "event_category": "tool"
        }"#;
        let entry: MetricEntry = serde_json::from_str(json).expect("entry");
        assert!(entry.data.is_empty());
        assert!(entry.tags.is_empty());
        assert_eq!(entry.source, MetricSource::Hook);
        assert_eq!(entry.event_category, EventCategory::Tool);
    }

    #[test]
    fn enums_reject_unknown_values() {
        assert!("hook".parse::<MetricSource>().is_ok());
        assert!("webhook".parse::<MetricSource>().is_err());
        assert!("api".parse::<EventCategory>().is_ok());
        assert!("network".parse::<EventCategory>().is_err());
        assert_eq!(
            "in_progress".parse::<TaskStatus>().expect("status"),
            TaskStatus::InProgress
        );
        assert_eq!(
            "pr_created".parse::<PlanEventType>().expect("event type"),
            PlanEventType::PrCreated
        );
    }

    #[test]
    fn task_status_transition_events() {
        assert_eq!(TaskStatus::Pending.transition_event(), None);
        assert_eq!(
            TaskStatus::InProgress.transition_event(),
            Some(PlanEventType::FeatureStarted)
        );
        assert_eq!(
            TaskStatus::Completed.transition_event(),
            Some(PlanEventType::FeatureCompleted)
        );
        assert_eq!(
            TaskStatus::Failed.transition_event(),
            Some(PlanEventType::FeatureFailed)
        );
    }
}
