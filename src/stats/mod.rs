//! Derived behavioral statistics
//!
//! Two engines consume the raw event log and persist results into
//! companion tables next to it:
//!
//! - sessions: `<table>__sessions` — per-user inactivity-gap segmentation
//! - engagement: `<table>__engagement` — daily/weekly/monthly active users
//!   and the stickiness ratio
//!
//! Both engines are resumable: each run reads its own last-written
//! checkpoint and processes only new data, then appends in one
//! transaction. Derived tables are append-only logs; corrections go
//! through a `clean` rebuild, never in-place mutation.
//!
//! Concurrent runs of the same engine against the same derived table are
//! NOT safe: two `clean = false` runs can read the same checkpoint and
//! double-append. Callers must serialize runs per derived table.

mod engagement;
mod sessions;

use crate::error::Result;
use crate::store::Tracker;
use chrono::NaiveDate;

/// Companion table suffix for sessions.
pub const SESSIONS_SUFFIX: &str = "sessions";

/// Companion table suffix for engagement.
pub const ENGAGEMENT_SUFFIX: &str = "engagement";

/// Parameters for a session-segmentation run.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Inactivity threshold (minutes) separating two sessions
    pub gap_minutes: f64,
    /// Drop and fully rebuild the session table before computing
    pub clean: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            gap_minutes: 30.0,
            clean: false,
        }
    }
}

/// Parameters for an engagement-aggregation run.
#[derive(Debug, Clone)]
pub struct EngagementOptions {
    /// Drop and fully rebuild the engagement table before computing
    pub clean: bool,
    /// Explicit lower bound, overriding checkpoint resolution
    pub start: Option<NaiveDate>,
    /// Minimum session count for the active cohort; 0 disables filtering
    pub min_sessions: u32,
}

impl Default for EngagementOptions {
    fn default() -> Self {
        Self {
            clean: false,
            start: None,
            min_sessions: 3,
        }
    }
}

/// Derived-statistics interface over an event tracker.
pub struct Statistics {
    tracker: Tracker,
}

impl Statistics {
    /// Wrap an event tracker.
    pub fn new(tracker: Tracker) -> Self {
        Self { tracker }
    }

    /// The underlying event tracker.
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Tracker over the derived session table.
    pub fn sessions_tracker(&self) -> Result<Tracker> {
        let schema = vec![
            (self.tracker.timestamp_field().to_string(), "DATETIME".to_string()),
            (self.tracker.user_field().to_string(), "TEXT".to_string()),
            ("duration".to_string(), "REAL".to_string()),
            ("total_events".to_string(), "INTEGER".to_string()),
        ];
        self.tracker.derived(SESSIONS_SUFFIX, schema)
    }

    /// Tracker over the derived engagement table.
    ///
    /// The full column set is always present; the `*_active` columns are
    /// NULL for runs without an effective cohort filter, so append-mode
    /// runs with different `min_sessions` settings stay schema-stable.
    pub fn engagement_tracker(&self) -> Result<Tracker> {
        let schema = vec![
            ("date".to_string(), "DATE".to_string()),
            ("dau".to_string(), "INTEGER".to_string()),
            ("wau".to_string(), "INTEGER".to_string()),
            ("mau".to_string(), "INTEGER".to_string()),
            ("engagement".to_string(), "REAL".to_string()),
            ("dau_active".to_string(), "INTEGER".to_string()),
            ("wau_active".to_string(), "INTEGER".to_string()),
            ("mau_active".to_string(), "INTEGER".to_string()),
            ("engagement_active".to_string(), "REAL".to_string()),
        ];
        self.tracker.derived(ENGAGEMENT_SUFFIX, schema)
    }
}
