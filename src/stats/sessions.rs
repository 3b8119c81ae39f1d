//! Session segmentation
//!
//! Partitions each user's event timeline into sessions: maximal runs of
//! events where no inter-event gap exceeds the configured threshold.

use super::{SessionOptions, Statistics};
use crate::error::Result;
use crate::store::{FieldPath, Filter};
use crate::types::{format_timestamp, parse_timestamp, SessionRow};
use chrono::NaiveDateTime;
use serde_json::{json, Value};

impl Statistics {
    /// Compute user sessions and append them to the session table.
    ///
    /// Resumes from the last written session start unless `clean` is set,
    /// in which case the table is dropped and rebuilt from the full event
    /// log. With no qualifying events the run is a silent no-op.
    ///
    /// Per-user timelines are materialized in memory, which is fine for
    /// moderate per-user volumes. When resuming, only events strictly
    /// after the checkpoint are considered, so a session that genuinely
    /// spans the checkpoint boundary is split across runs.
    pub fn compute_sessions(&self, options: &SessionOptions) -> Result<()> {
        let stats = self.sessions_tracker()?;
        let user_field = self.tracker().user_field();
        let timestamp_field = self.tracker().timestamp_field();

        if options.clean && stats.table_exists()? {
            stats.drop_table()?;
        }

        // Last session start already persisted, if any.
        let checkpoint = stats
            .last_entry(timestamp_field)?
            .and_then(|v| v.as_str().map(String::from));

        let mut filters = Vec::new();
        if let Some(cp) = &checkpoint {
            filters.push(Filter::gt(timestamp_field, cp.clone()));
        }

        let users: Vec<String> = self
            .tracker()
            .distinct_values(&FieldPath::column(user_field), &filters)?
            .into_iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();

        if users.is_empty() {
            tracing::debug!(?checkpoint, "No new events, skipping session run");
            return Ok(());
        }

        let timestamp_path = FieldPath::column(timestamp_field);
        let mut rows: Vec<SessionRow> = Vec::new();

        for user in &users {
            let mut user_filters = filters.clone();
            user_filters.push(Filter::eq(user_field, user.clone()));

            let mut timestamps: Vec<NaiveDateTime> = self
                .tracker()
                .read_fields(std::slice::from_ref(&timestamp_path), false, &user_filters)?
                .into_iter()
                .filter_map(|mut row| row.pop())
                .filter_map(|v| v.as_str().and_then(|s| parse_timestamp(s).ok()))
                .collect();
            timestamps.sort();

            rows.extend(split_into_sessions(user, &timestamps, options.gap_minutes));
        }

        rows.sort_by_key(|row| row.timestamp);

        if !stats.table_exists()? {
            stats.create_table()?;
        }

        let batch: Vec<Vec<(String, Value)>> = rows
            .iter()
            .map(|row| {
                vec![
                    (timestamp_field.to_string(), json!(format_timestamp(row.timestamp))),
                    (user_field.to_string(), json!(row.user_id)),
                    ("duration".to_string(), json!(row.duration)),
                    ("total_events".to_string(), json!(row.total_events)),
                ]
            })
            .collect();
        stats.write_batch(&batch)?;

        tracing::info!(
            sessions = rows.len(),
            users = users.len(),
            resumed = checkpoint.is_some(),
            "Computed sessions"
        );
        Ok(())
    }

    /// Read back the derived session table, ordered by start time.
    pub fn sessions(&self) -> Result<Vec<SessionRow>> {
        let stats = self.sessions_tracker()?;
        let user_field = self.tracker().user_field();
        let timestamp_field = self.tracker().timestamp_field();

        let fields = [
            FieldPath::column(timestamp_field),
            FieldPath::column(user_field),
            FieldPath::column("duration"),
            FieldPath::column("total_events"),
        ];

        let mut rows = Vec::new();
        for values in stats.read_fields(&fields, false, &[])? {
            let timestamp = values[0]
                .as_str()
                .and_then(|s| parse_timestamp(s).ok())
                .unwrap_or_default();
            rows.push(SessionRow {
                timestamp,
                user_id: values[1].as_str().unwrap_or_default().to_string(),
                duration: values[2].as_f64().unwrap_or_default(),
                total_events: values[3].as_i64().unwrap_or_default(),
            });
        }
        rows.sort_by_key(|row| row.timestamp);
        Ok(rows)
    }
}

/// Split one user's sorted timestamps at gaps exceeding the threshold.
fn split_into_sessions(
    user: &str,
    timestamps: &[NaiveDateTime],
    gap_minutes: f64,
) -> Vec<SessionRow> {
    let mut rows = Vec::new();
    if timestamps.is_empty() {
        return rows;
    }

    let gap_of = |a: NaiveDateTime, b: NaiveDateTime| (b - a).num_seconds() as f64 / 60.0;

    let mut start = 0;
    for i in 1..=timestamps.len() {
        let boundary = i == timestamps.len() || gap_of(timestamps[i - 1], timestamps[i]) > gap_minutes;
        if boundary {
            let first = timestamps[start];
            let last = timestamps[i - 1];
            rows.push(SessionRow {
                timestamp: first,
                user_id: user.to_string(),
                duration: gap_of(first, last),
                total_events: (i - start) as i64,
            });
            start = i;
        }
    }
    rows
}
