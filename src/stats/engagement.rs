//! Engagement aggregation
//!
//! Rolls the derived session table up into one row per calendar date:
//! daily, weekly, and monthly active users plus the DAU/MAU stickiness
//! ratio, optionally restricted to a cohort of frequent users.

use super::{EngagementOptions, Statistics};
use crate::error::Result;
use crate::store::{AggregateQuery, FieldPath, Filter};
use crate::types::{format_date, format_timestamp, parse_date, EngagementRow, Resolution};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use std::collections::HashMap;

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

impl Statistics {
    /// Compute daily engagement rows and append them to the engagement
    /// table.
    ///
    /// Dates are derived from session starts. WAU and MAU for date `D`
    /// count distinct users with a session start inside the trailing
    /// 7-day and 30-day windows ending at `D`'s end of day.
    ///
    /// With `min_sessions > 0`, the `*_active` columns repeat the counts
    /// restricted to users holding at least that many sessions overall.
    /// When no user qualifies the run degrades to the unfiltered counts
    /// and leaves the `*_active` columns NULL rather than failing.
    ///
    /// Resumes from the last written date unless `clean` is set; an
    /// explicit `start` overrides the checkpoint. Without sessions to
    /// aggregate the run is a silent no-op.
    pub fn compute_engagement(&self, options: &EngagementOptions) -> Result<()> {
        let sessions = self.sessions_tracker()?;
        let engagement = self.engagement_tracker()?;
        let user_field = self.tracker().user_field();
        let timestamp_field = self.tracker().timestamp_field();
        let user_path = FieldPath::column(user_field);

        if options.clean && engagement.table_exists()? {
            engagement.drop_table()?;
        }

        if !sessions.table_exists()? {
            tracing::debug!("No session table, skipping engagement run");
            return Ok(());
        }

        let checkpoint = engagement
            .last_entry("date")?
            .and_then(|v| v.as_str().and_then(|s| parse_date(s).ok()));
        let start = options
            .start
            .or_else(|| checkpoint.map(|d| d + Duration::days(1)));

        let mut filters = Vec::new();
        if let Some(start) = start {
            filters.push(Filter::gt(
                timestamp_field,
                format_timestamp(midnight(start)),
            ));
        }

        // Cohort membership counts the full session history, not just the
        // incremental slice, so resumed runs agree with clean rebuilds.
        let mut cohort: Vec<String> = Vec::new();
        if options.min_sessions > 0 {
            let mut counts: HashMap<String, i64> = HashMap::new();
            for mut row in sessions.read_fields(std::slice::from_ref(&user_path), false, &[])? {
                if let Some(user) = row.pop().and_then(|v| v.as_str().map(String::from)) {
                    *counts.entry(user).or_insert(0) += 1;
                }
            }
            cohort = counts
                .into_iter()
                .filter(|(_, count)| *count >= options.min_sessions as i64)
                .map(|(user, _)| user)
                .collect();
            cohort.sort();
            if cohort.is_empty() {
                tracing::warn!(
                    min_sessions = options.min_sessions,
                    "No user reaches the session threshold, disabling cohort columns"
                );
            }
        }
        let cohort_active = !cohort.is_empty();

        let dau = sessions.count(
            Some(&user_path),
            true,
            &AggregateQuery {
                resolution: Resolution::Day,
                filters: filters.clone(),
                ..Default::default()
            },
        )?;
        if dau.is_empty() {
            tracing::debug!(?start, "No new dates, skipping engagement run");
            return Ok(());
        }

        let dau_active: HashMap<NaiveDate, i64> = if cohort_active {
            let mut cohort_filters = filters.clone();
            cohort_filters.push(Filter::is_in(user_field, cohort.clone()));
            sessions
                .count(
                    Some(&user_path),
                    true,
                    &AggregateQuery {
                        resolution: Resolution::Day,
                        filters: cohort_filters,
                        ..Default::default()
                    },
                )?
                .into_iter()
                .map(|bucket| (bucket.datetime.date(), bucket.value))
                .collect()
        } else {
            HashMap::new()
        };

        // Distinct users with a session start in the trailing window
        // (window_days back, end of `date`].
        let window_users = |date: NaiveDate, window_days: i64, cohort_only: bool| -> Result<i64> {
            let mut window_filters = vec![
                Filter::gt(
                    timestamp_field,
                    format_timestamp(midnight(date - Duration::days(window_days - 1))),
                ),
                Filter::lte(
                    timestamp_field,
                    format_timestamp(midnight(date + Duration::days(1))),
                ),
            ];
            if cohort_only {
                window_filters.push(Filter::is_in(user_field, cohort.clone()));
            }
            Ok(sessions.distinct_values(&user_path, &window_filters)?.len() as i64)
        };

        let mut batch: Vec<Vec<(String, Value)>> = Vec::with_capacity(dau.len());
        for bucket in &dau {
            let date = bucket.datetime.date();
            let wau = window_users(date, 7, false)?;
            let mau = window_users(date, 30, false)?;

            let (dau_a, wau_a, mau_a, engagement_a) = if cohort_active {
                let dau_a = dau_active.get(&date).copied().unwrap_or(0);
                let wau_a = window_users(date, 7, true)?;
                let mau_a = window_users(date, 30, true)?;
                let engagement_a = (mau_a > 0).then(|| dau_a as f64 / mau_a as f64);
                (Some(dau_a), Some(wau_a), Some(mau_a), engagement_a)
            } else {
                (None, None, None, None)
            };

            let optional = |v: Option<i64>| v.map_or(Value::Null, |n| json!(n));
            batch.push(vec![
                ("date".to_string(), json!(format_date(date))),
                ("dau".to_string(), json!(bucket.value)),
                ("wau".to_string(), json!(wau)),
                ("mau".to_string(), json!(mau)),
                (
                    "engagement".to_string(),
                    json!(bucket.value as f64 / mau as f64),
                ),
                ("dau_active".to_string(), optional(dau_a)),
                ("wau_active".to_string(), optional(wau_a)),
                ("mau_active".to_string(), optional(mau_a)),
                (
                    "engagement_active".to_string(),
                    engagement_a.map_or(Value::Null, |e| json!(e)),
                ),
            ]);
        }

        if !engagement.table_exists()? {
            engagement.create_table()?;
        }
        engagement.write_batch(&batch)?;

        tracing::info!(
            dates = batch.len(),
            cohort = cohort.len(),
            resumed = checkpoint.is_some(),
            "Computed engagement"
        );
        Ok(())
    }

    /// Read back the derived engagement table, ordered by date.
    pub fn engagement(&self) -> Result<Vec<EngagementRow>> {
        let tracker = self.engagement_tracker()?;
        let fields: Vec<FieldPath> = [
            "date",
            "dau",
            "wau",
            "mau",
            "engagement",
            "dau_active",
            "wau_active",
            "mau_active",
            "engagement_active",
        ]
        .into_iter()
        .map(FieldPath::column)
        .collect();

        let mut rows = Vec::new();
        for values in tracker.read_fields(&fields, false, &[])? {
            let date = values[0]
                .as_str()
                .and_then(|s| parse_date(s).ok())
                .unwrap_or_default();
            rows.push(EngagementRow {
                date,
                dau: values[1].as_i64().unwrap_or_default(),
                wau: values[2].as_i64().unwrap_or_default(),
                mau: values[3].as_i64().unwrap_or_default(),
                engagement: values[4].as_f64().unwrap_or_default(),
                dau_active: values[5].as_i64(),
                wau_active: values[6].as_i64(),
                mau_active: values[7].as_i64(),
                engagement_active: values[8].as_f64(),
            });
        }
        rows.sort_by_key(|row| row.date);
        Ok(rows)
    }
}
