use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Calendar-aligned bucket width. All arithmetic is done in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Hour,
    Day,
    Week,
    Month,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Start of the bucket containing `ts`. Weeks start on Monday.
    pub fn floor(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Hour => ts
                .with_minute(0)
                .and_then(|value| value.with_second(0))
                .and_then(|value| value.with_nanosecond(0))
                .unwrap_or(ts),
            Self::Day => midnight(ts),
            Self::Week => {
                let days_back = ts.weekday().num_days_from_monday() as i64;
                midnight(ts) - Duration::days(days_back)
            }
            Self::Month => {
                let first = ts.date_naive().with_day(1).unwrap_or(ts.date_naive());
                Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN))
            }
        }
    }

    /// `bucket_start` plus one period unit; months have variable length.
    pub fn advance(&self, bucket_start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Hour => bucket_start + Duration::hours(1),
            Self::Day => bucket_start + Duration::days(1),
            Self::Week => bucket_start + Duration::weeks(1),
            Self::Month => bucket_start
                .checked_add_months(Months::new(1))
                .unwrap_or(bucket_start + Duration::days(31)),
        }
    }

    /// Upper bound on the number of buckets `[start, end)` touches.
    pub fn max_buckets(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
        if end <= start {
            return 0;
        }
        let span = end - self.floor(start);
        let buckets = match self {
            Self::Hour => span.num_hours(),
            Self::Day => span.num_days(),
            Self::Week => span.num_weeks(),
            Self::Month => span.num_days() / 28,
        };
        buckets.max(0) as u64 + 1
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(ValidationError::UnknownVariant {
                field: "period",
                value: other.to_string(),
            }),
        }
    }
}

fn midnight(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&ts.date_naive().and_time(NaiveTime::MIN))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMetric {
    Count,
    Cost,
    Tokens,
}

impl AggregateMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Cost => "cost",
            Self::Tokens => "tokens",
        }
    }
}

impl FromStr for AggregateMetric {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "count" => Ok(Self::Count),
            "cost" => Ok(Self::Cost),
            "tokens" => Ok(Self::Tokens),
            other => Err(ValidationError::UnknownVariant {
                field: "metric",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Model,
    EventType,
    Session,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::EventType => "event_type",
            Self::Session => "session",
        }
    }
}

impl FromStr for GroupBy {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "model" => Ok(Self::Model),
            "event_type" => Ok(Self::EventType),
            "session" => Ok(Self::Session),
            other => Err(ValidationError::UnknownVariant {
                field: "group_by",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn floors_to_calendar_boundaries() {
        let value = ts("2025-03-13T10:45:12.500Z");
        assert_eq!(Period::Hour.floor(value), ts("2025-03-13T10:00:00Z"));
        assert_eq!(Period::Day.floor(value), ts("2025-03-13T00:00:00Z"));
        // 2025-03-13 is a Thursday.
        assert_eq!(Period::Week.floor(value), ts("2025-03-10T00:00:00Z"));
        assert_eq!(Period::Month.floor(value), ts("2025-03-01T00:00:00Z"));
    }

    #[test]
    fn month_advance_uses_calendar_length() {
        let feb = ts("2024-02-01T00:00:00Z");
        assert_eq!(Period::Month.advance(feb), ts("2024-03-01T00:00:00Z"));
        let jan = ts("2025-01-01T00:00:00Z");
        assert_eq!(Period::Month.advance(jan), ts("2025-02-01T00:00:00Z"));
        let dec = ts("2025-12-01T00:00:00Z");
        assert_eq!(Period::Month.advance(dec), ts("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn max_buckets_counts_partial_edges() {
        let start = ts("2025-01-01T10:30:00Z");
        let end = ts("2025-01-01T12:00:00Z");
        assert_eq!(Period::Hour.max_buckets(start, end), 3);
        assert_eq!(Period::Day.max_buckets(end, start), 0);
    }

    #[test]
    fn parses_known_values_only() {
        assert_eq!("week".parse::<Period>().expect("period"), Period::Week);
        assert!("fortnight".parse::<Period>().is_err());
        assert_eq!(
            "tokens".parse::<AggregateMetric>().expect("metric"),
            AggregateMetric::Tokens
        );
        assert!("latency".parse::<AggregateMetric>().is_err());
        assert_eq!(
            "event_type".parse::<GroupBy>().expect("group"),
            GroupBy::EventType
        );
        assert!("project".parse::<GroupBy>().is_err());
    }
}
