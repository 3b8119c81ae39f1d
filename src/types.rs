//! Domain types shared across the store and stats layers.
//!
//! Timestamps are persisted as `"%Y-%m-%d %H:%M:%S"` TEXT and dates as
//! `"%Y-%m-%d"`. Both formats compare correctly as strings, which the
//! store relies on for range filters and checkpoint cursors.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Storage format for timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage format for dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a timestamp for storage.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Accepts a bare date as midnight.
pub fn parse_timestamp(s: &str) -> crate::error::Result<NaiveDateTime> {
    if let Ok(ts) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(s, DATE_FORMAT)?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Format a date for storage.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a stored date.
pub fn parse_date(s: &str) -> crate::error::Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, DATE_FORMAT)?)
}

/// A single tracked event (default schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Row ID assigned by the store
    pub id: i64,
    /// When the event occurred
    pub timestamp: Option<NaiveDateTime>,
    /// Who performed the event
    pub user_id: Option<String>,
    /// Event name
    pub event: Option<String>,
    /// Arbitrary structured metadata
    pub metadata: serde_json::Value,
}

/// A derived user session: a maximal run of one user's events where no
/// inter-event gap exceeds the configured threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    /// Session start (timestamp of the first event in the run)
    pub timestamp: NaiveDateTime,
    /// User the session belongs to
    pub user_id: String,
    /// Minutes from the first to the last event (0 for a singleton)
    pub duration: f64,
    /// Number of events in the run
    pub total_events: i64,
}

/// One derived engagement row per calendar date.
///
/// The `*_active` fields are populated only by runs with an effective
/// minimum-session-count cohort filter; otherwise they are stored as NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementRow {
    /// Calendar date the row describes
    pub date: NaiveDate,
    /// Distinct users with a session starting on `date`
    pub dau: i64,
    /// Distinct users with a session in the trailing 7-day window
    pub wau: i64,
    /// Distinct users with a session in the trailing 30-day window
    pub mau: i64,
    /// Stickiness ratio, `dau / mau`
    pub engagement: f64,
    /// DAU restricted to the active cohort
    pub dau_active: Option<i64>,
    /// WAU restricted to the active cohort
    pub wau_active: Option<i64>,
    /// MAU restricted to the active cohort
    pub mau_active: Option<i64>,
    /// `dau_active / mau_active`; None when `mau_active` is 0
    pub engagement_active: Option<f64>,
}

/// Time bucket resolution for aggregate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Calendar hour
    Hour,
    /// Calendar day
    #[default]
    Day,
    /// Calendar week, Monday-start
    Week,
    /// Calendar month
    Month,
}

impl Resolution {
    /// Convert to string for logging and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hour => "hour",
            Resolution::Day => "day",
            Resolution::Week => "week",
            Resolution::Month => "month",
        }
    }

    /// SQL expression that maps a timestamp column to its bucket label.
    pub(crate) fn bucket_expr(&self, column: &str) -> String {
        match self {
            Resolution::Hour => format!("strftime('%Y-%m-%d %H:00:00', \"{column}\")"),
            Resolution::Day => format!("date(\"{column}\")"),
            // Back up six days, then advance to the next-or-same Monday.
            Resolution::Week => format!("date(\"{column}\", '-6 days', 'weekday 1')"),
            Resolution::Month => format!("date(\"{column}\", 'start of month')"),
        }
    }
}

/// One row of an aggregate query: a bucket label and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBucket<T> {
    /// Bucket start (hour resolution keeps the hour; the rest are midnight)
    pub datetime: NaiveDateTime,
    /// Aggregated value for the bucket
    pub value: T,
}
