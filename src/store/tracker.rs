//! Table-scoped event store operations.

use super::db::Database;
use super::filter::{to_sql_value, where_clause, Filter};
use super::path::FieldPath;
use crate::error::{Error, Result};
use crate::types::{format_timestamp, parse_timestamp, Event, Resolution, TimeBucket};
use chrono::NaiveDateTime;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, OptionalExtension};
use serde_json::Value;
use std::sync::Arc;

/// Ordered column definitions for a tracker table.
pub type TableSchema = Vec<(String, String)>;

/// Parameters for a time-bucketed aggregate query.
#[derive(Debug, Clone, Default)]
pub struct AggregateQuery {
    /// Bucket granularity
    pub resolution: Resolution,
    /// Inclusive lower bound on the timestamp column
    pub start: Option<NaiveDateTime>,
    /// Inclusive upper bound on the timestamp column
    pub end: Option<NaiveDateTime>,
    /// Additional predicates
    pub filters: Vec<Filter>,
}

/// Handle on one event table.
///
/// A tracker with neither database nor table is "disabled": writes are
/// silently dropped so instrumented code keeps working with tracking off.
/// A tracker with only one of the two configured fails loudly on use.
pub struct Tracker {
    db: Option<Arc<Database>>,
    table: Option<String>,
    user_field: String,
    timestamp_field: String,
    json_field: String,
    schema: TableSchema,
    auto_timestamp: bool,
}

/// The default event schema.
fn default_schema(user_field: &str, timestamp_field: &str, json_field: &str) -> TableSchema {
    vec![
        ("id".to_string(), "INTEGER PRIMARY KEY AUTOINCREMENT".to_string()),
        (
            timestamp_field.to_string(),
            "DATETIME DEFAULT CURRENT_TIMESTAMP".to_string(),
        ),
        (user_field.to_string(), "TEXT".to_string()),
        ("event".to_string(), "TEXT".to_string()),
        (json_field.to_string(), "JSON".to_string()),
    ]
}

impl Tracker {
    /// Create a tracker over `table` with the default event schema.
    pub fn new(db: Arc<Database>, table: &str) -> Self {
        let schema = default_schema("user_id", "timestamp", "metadata");
        Self {
            db: Some(db),
            table: Some(table.to_string()),
            user_field: "user_id".to_string(),
            timestamp_field: "timestamp".to_string(),
            json_field: "metadata".to_string(),
            schema,
            auto_timestamp: true,
        }
    }

    /// Build a tracker from configuration.
    pub fn from_config(db: Arc<Database>, config: &crate::config::Config) -> Self {
        let store = &config.store;
        let schema = default_schema(&store.user_field, &store.timestamp_field, &store.json_field);
        Self {
            db: Some(db),
            table: Some(store.table.clone()),
            user_field: store.user_field.clone(),
            timestamp_field: store.timestamp_field.clone(),
            json_field: store.json_field.clone(),
            schema,
            auto_timestamp: true,
        }
    }

    /// A disabled tracker: no database, no table, writes are no-ops.
    pub fn disabled() -> Self {
        Self {
            db: None,
            table: None,
            user_field: "user_id".to_string(),
            timestamp_field: "timestamp".to_string(),
            json_field: "metadata".to_string(),
            schema: default_schema("user_id", "timestamp", "metadata"),
            auto_timestamp: true,
        }
    }

    /// Replace the table schema (ordered column name/type pairs).
    pub fn with_schema(mut self, schema: TableSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Override the user-identifier column.
    pub fn with_user_field(mut self, field: &str) -> Self {
        self.user_field = field.to_string();
        self
    }

    /// Override the timestamp column.
    pub fn with_timestamp_field(mut self, field: &str) -> Self {
        self.timestamp_field = field.to_string();
        self
    }

    /// Override the JSON metadata column.
    pub fn with_json_field(mut self, field: &str) -> Self {
        self.json_field = field.to_string();
        self
    }

    /// Enable or disable client-side timestamp fill on write.
    pub fn with_auto_timestamp(mut self, auto: bool) -> Self {
        self.auto_timestamp = auto;
        self
    }

    /// The user-identifier column name.
    pub fn user_field(&self) -> &str {
        &self.user_field
    }

    /// The timestamp column name.
    pub fn timestamp_field(&self) -> &str {
        &self.timestamp_field
    }

    /// The JSON metadata column name.
    pub fn json_field(&self) -> &str {
        &self.json_field
    }

    /// The table name, if configured.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// A tracker over a companion table (`<table>__<suffix>`), sharing the
    /// database and field names but carrying its own schema.
    pub fn derived(&self, suffix: &str, schema: TableSchema) -> Result<Tracker> {
        let (db, table) = self.require()?;
        Ok(Tracker {
            db: Some(Arc::clone(db)),
            table: Some(format!("{table}__{suffix}")),
            user_field: self.user_field.clone(),
            timestamp_field: self.timestamp_field.clone(),
            json_field: self.json_field.clone(),
            schema,
            auto_timestamp: false,
        })
    }

    fn require(&self) -> Result<(&Arc<Database>, &str)> {
        match (&self.db, &self.table) {
            (Some(db), Some(table)) => Ok((db, table.as_str())),
            _ => Err(Error::Config(
                "tracker requires both a database and a table".to_string(),
            )),
        }
    }

    // ============================================
    // DDL
    // ============================================

    /// Create the table from the tracker's schema. Errors if it exists.
    pub fn create_table(&self) -> Result<()> {
        let (db, table) = self.require()?;
        let columns = self
            .schema
            .iter()
            .map(|(name, ty)| format!("\"{name}\" {ty}"))
            .collect::<Vec<_>>()
            .join(", ");
        db.connection()
            .execute(&format!("CREATE TABLE \"{table}\" ({columns})"), [])?;
        tracing::info!(table, "Created table");
        Ok(())
    }

    /// Drop the table. Errors if it does not exist.
    pub fn drop_table(&self) -> Result<()> {
        let (db, table) = self.require()?;
        db.connection()
            .execute(&format!("DROP TABLE \"{table}\""), [])?;
        tracing::info!(table, "Dropped table");
        Ok(())
    }

    /// Whether the table currently exists. A tracker without a database
    /// or table has no table by definition.
    pub fn table_exists(&self) -> Result<bool> {
        match (&self.db, &self.table) {
            (Some(db), Some(table)) => db.table_exists(table),
            _ => Ok(false),
        }
    }

    // ============================================
    // Writes
    // ============================================

    /// Insert one row.
    ///
    /// Fails loudly on any store error, except in disabled mode (neither
    /// database nor table configured) where the write is silently dropped.
    pub fn write(&self, fields: &[(&str, Value)]) -> Result<()> {
        let (db, table) = match (&self.db, &self.table) {
            (None, None) => {
                tracing::debug!("Tracker disabled, dropping write");
                return Ok(());
            }
            (Some(db), Some(table)) => (db, table.as_str()),
            _ => {
                return Err(Error::Config(
                    "tracker requires both a database and a table".to_string(),
                ))
            }
        };

        let mut columns: Vec<String> = fields.iter().map(|(name, _)| name.to_string()).collect();
        let mut params: Vec<SqlValue> = fields.iter().map(|(_, v)| to_sql_value(v)).collect();

        // Fill the timestamp client-side when the schema has the column,
        // the caller didn't, and the table won't default it.
        if self.auto_timestamp
            && !columns.iter().any(|c| c == &self.timestamp_field)
            && self.schema.iter().any(|(name, ty)| {
                name == &self.timestamp_field && !ty.to_uppercase().contains("DEFAULT")
            })
        {
            columns.push(self.timestamp_field.clone());
            params.push(SqlValue::Text(format_timestamp(
                chrono::Utc::now().naive_utc(),
            )));
        }

        let column_sql = columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");

        db.connection().execute(
            &format!("INSERT INTO \"{table}\" ({column_sql}) VALUES ({placeholders})"),
            params_from_iter(params),
        )?;
        Ok(())
    }

    /// Insert many rows in a single transaction.
    ///
    /// This is the atomicity unit of the derived engines: a run either
    /// appends all of its rows or none of them.
    pub fn write_batch(&self, rows: &[Vec<(String, Value)>]) -> Result<()> {
        let (db, table) = self.require()?;
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = db.connection();
        let tx = conn.transaction()?;
        for row in rows {
            let column_sql = row
                .iter()
                .map(|(name, _)| format!("\"{name}\""))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = vec!["?"; row.len()].join(", ");
            let params: Vec<SqlValue> = row.iter().map(|(_, v)| to_sql_value(v)).collect();
            tx.execute(
                &format!("INSERT INTO \"{table}\" ({column_sql}) VALUES ({placeholders})"),
                params_from_iter(params),
            )?;
        }
        tx.commit()?;
        tracing::debug!(table, rows = rows.len(), "Appended rows");
        Ok(())
    }

    // ============================================
    // Reads
    // ============================================

    /// Read full rows from a default-schema table.
    pub fn read(&self, filters: &[Filter]) -> Result<Vec<Event>> {
        let (db, table) = self.require()?;
        let (where_sql, params) = where_clause(filters, &self.json_field);
        let sql = format!("SELECT * FROM \"{table}\"{where_sql}");

        let conn = db.connection();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            let timestamp: Option<String> = row.get(self.timestamp_field.as_str())?;
            let user_id: Option<String> = row.get(self.user_field.as_str())?;
            let event: Option<String> = row.get("event")?;
            let metadata: Option<String> = row.get(self.json_field.as_str())?;
            Ok((row.get::<_, i64>("id")?, timestamp, user_id, event, metadata))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, user_id, event, metadata) = row?;
            events.push(Event {
                id,
                timestamp: timestamp.as_deref().and_then(|s| parse_timestamp(s).ok()),
                user_id,
                event,
                metadata: metadata
                    .as_deref()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or(Value::Null),
            });
        }
        Ok(events)
    }

    /// Read a projection, optionally DISTINCT, as raw JSON values.
    pub fn read_fields(
        &self,
        fields: &[FieldPath],
        distinct: bool,
        filters: &[Filter],
    ) -> Result<Vec<Vec<Value>>> {
        let (db, table) = self.require()?;
        let projection = fields
            .iter()
            .map(FieldPath::sql_projection)
            .collect::<Vec<_>>()
            .join(", ");
        let keyword = if distinct { "DISTINCT " } else { "" };
        let (where_sql, params) = where_clause(filters, &self.json_field);
        let sql = format!("SELECT {keyword}{projection} FROM \"{table}\"{where_sql}");

        let conn = db.connection();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            let mut values = Vec::with_capacity(fields.len());
            for i in 0..fields.len() {
                values.push(value_ref_to_json(row.get_ref(i)?));
            }
            Ok(values)
        })?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Distinct non-null values of one field.
    pub fn distinct_values(&self, field: &FieldPath, filters: &[Filter]) -> Result<Vec<Value>> {
        let rows = self.read_fields(std::slice::from_ref(field), true, filters)?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| match row.pop() {
                Some(Value::Null) | None => None,
                Some(value) => Some(value),
            })
            .collect())
    }

    // ============================================
    // Aggregates
    // ============================================

    fn aggregate<T: rusqlite::types::FromSql>(
        &self,
        measure: String,
        query: &AggregateQuery,
    ) -> Result<Vec<TimeBucket<T>>> {
        let (db, table) = self.require()?;
        let bucket = query.resolution.bucket_expr(&self.timestamp_field);

        let mut filters = query.filters.clone();
        if let Some(start) = query.start {
            filters.push(Filter::gte(
                self.timestamp_field.as_str(),
                format_timestamp(start),
            ));
        }
        if let Some(end) = query.end {
            filters.push(Filter::lte(
                self.timestamp_field.as_str(),
                format_timestamp(end),
            ));
        }
        let (where_sql, params) = where_clause(&filters, &self.json_field);

        let sql = format!(
            "SELECT {bucket} AS datetime, {measure} AS value FROM \"{table}\"{where_sql} \
             GROUP BY datetime ORDER BY datetime"
        );

        let conn = db.connection();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, T>(1)?))
        })?;

        let mut buckets = Vec::new();
        for row in rows {
            let (label, value) = row?;
            buckets.push(TimeBucket {
                datetime: parse_timestamp(&label)?,
                value,
            });
        }
        Ok(buckets)
    }

    /// Count rows per time bucket. With a field, counts non-null values of
    /// that field; `distinct` counts distinct values instead.
    pub fn count(
        &self,
        field: Option<&FieldPath>,
        distinct: bool,
        query: &AggregateQuery,
    ) -> Result<Vec<TimeBucket<i64>>> {
        let measure = match field {
            None => "COUNT(*)".to_string(),
            Some(path) if distinct => format!("COUNT(DISTINCT {})", path.sql()),
            Some(path) => format!("COUNT({})", path.sql()),
        };
        self.aggregate(measure, query)
    }

    /// Sum a field per time bucket.
    pub fn sum(&self, field: &FieldPath, query: &AggregateQuery) -> Result<Vec<TimeBucket<f64>>> {
        self.aggregate(format!("TOTAL({})", field.sql()), query)
    }

    /// Average a field per time bucket.
    pub fn average(
        &self,
        field: &FieldPath,
        query: &AggregateQuery,
    ) -> Result<Vec<TimeBucket<f64>>> {
        self.aggregate(format!("AVG({})", field.sql()), query)
    }

    // ============================================
    // Incremental cursor
    // ============================================

    /// The most recent value of a column, for resumable computation.
    ///
    /// Returns `None` when the table is missing or empty; a missing
    /// checkpoint table is not an error.
    pub fn last_entry(&self, column: &str) -> Result<Option<Value>> {
        if !self.table_exists()? {
            return Ok(None);
        }
        let (db, table) = self.require()?;
        let conn = db.connection();
        let value = conn
            .query_row(
                &format!(
                    "SELECT \"{column}\" FROM \"{table}\" ORDER BY \"{column}\" DESC LIMIT 1"
                ),
                [],
                |row| Ok(value_ref_to_json(row.get_ref(0)?)),
            )
            .optional()?;
        Ok(value.filter(|v| !v.is_null()))
    }
}

/// Map an SQLite value onto JSON.
fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn tracker() -> Tracker {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Tracker::new(db, "events")
    }

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> Value {
        json!(format!("{y:04}-{m:02}-{d:02} {h:02}:{min:02}:00"))
    }

    /// The login fixture: twelve logins across three months, one decoy event.
    fn seed_logins(tracker: &Tracker) {
        let rows = [
            (2016, 1, 1, 12, 30, "alice", "logged_in"),
            (2016, 1, 1, 12, 40, "bob", "logged_in"),
            (2016, 1, 1, 16, 0, "charlotte", "logged_in"),
            (2016, 1, 2, 0, 0, "dan", "logged_in"),
            (2016, 1, 2, 0, 0, "elizabeth", "logged_in"),
            (2016, 1, 5, 0, 0, "frank", "logged_in"),
            (2016, 1, 10, 0, 0, "gabrielle", "logged_in"),
            (2016, 1, 20, 0, 0, "hans", "logged_in"),
            (2016, 2, 1, 0, 0, "iris", "logged_in"),
            (2016, 2, 1, 0, 0, "james", "logged_in"),
            (2016, 3, 1, 0, 0, "kelly", "logged_in"),
            (2016, 3, 1, 0, 0, "laura", "logged_in"),
            (2016, 3, 1, 0, 0, "mike", "not_logged_in"),
        ];
        for (y, m, d, h, min, user, event) in rows {
            tracker
                .write(&[
                    ("timestamp", ts(y, m, d, h, min)),
                    ("user_id", json!(user)),
                    ("event", json!(event)),
                    ("metadata", json!({"val": 1})),
                ])
                .unwrap();
        }
    }

    #[test]
    fn test_create_table_twice_errors() {
        let t = tracker();
        t.create_table().unwrap();
        assert!(t.create_table().is_err());
    }

    #[test]
    fn test_drop_table_semantics() {
        let t = tracker();
        assert!(t.drop_table().is_err());
        t.create_table().unwrap();
        t.drop_table().unwrap();
        t.create_table().unwrap();
    }

    #[test]
    fn test_table_exists_probe() {
        let t = tracker();
        assert!(!t.table_exists().unwrap());
        t.create_table().unwrap();
        assert!(t.table_exists().unwrap());
    }

    #[test]
    fn test_read_with_filters() {
        let t = tracker();
        t.create_table().unwrap();
        assert!(t.read(&[]).unwrap().is_empty());

        t.write(&[("user_id", json!("Footfall")), ("event", json!("Testing !"))])
            .unwrap();
        t.write(&[("user_id", json!("Footfall"))]).unwrap();
        t.write(&[("event", json!("No user"))]).unwrap();
        t.write(&[
            ("user_id", json!("import this")),
            ("event", json!("very zen")),
            (
                "metadata",
                json!({
                    "better": "forgiveness",
                    "worse": "permission",
                    "ordered": ["simple", "complex", "complicated"]
                }),
            ),
        ])
        .unwrap();

        assert_eq!(t.read(&[]).unwrap().len(), 4);
        assert_eq!(t.read(&[Filter::eq("user_id", "Footfall")]).unwrap().len(), 2);
        assert_eq!(t.read(&[Filter::gt("id", 10)]).unwrap().len(), 0);
        assert_eq!(
            t.read(&[Filter::gte("id", 1), Filter::lt("id", 3)])
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            t.read(&[Filter::lte("id", 100), Filter::eq("event", "very zen")])
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            t.read(&[Filter::contains("metadata", "better")]).unwrap().len(),
            1
        );
        assert_eq!(
            t.read(&[Filter::contains("metadata", "whisky")]).unwrap().len(),
            0
        );
    }

    #[test]
    fn test_count_resolutions() {
        let t = tracker();
        t.create_table().unwrap();
        seed_logins(&t);

        let logged_in = || vec![Filter::eq("event", "logged_in")];

        let hourly = t
            .count(
                None,
                false,
                &AggregateQuery {
                    resolution: Resolution::Hour,
                    filters: logged_in(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(hourly.len(), 8);
        let hourly_counts: Vec<i64> = hourly.iter().map(|b| b.value).collect();
        assert_eq!(hourly_counts, vec![2, 1, 2, 1, 1, 1, 2, 2]);

        let daily = t
            .count(
                None,
                false,
                &AggregateQuery {
                    filters: logged_in(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(daily.len(), 7);
        let daily_counts: Vec<i64> = daily.iter().map(|b| b.value).collect();
        assert_eq!(daily_counts, vec![3, 2, 1, 1, 1, 2, 2]);

        let weekly = t
            .count(
                None,
                false,
                &AggregateQuery {
                    resolution: Resolution::Week,
                    filters: logged_in(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(weekly.len(), 5);
        let weekly_counts: Vec<i64> = weekly.iter().map(|b| b.value).collect();
        assert_eq!(weekly_counts, vec![5, 2, 1, 2, 2]);
        // Weeks start on Monday: 2016-01-01 was a Friday.
        assert_eq!(
            weekly[0].datetime.date(),
            NaiveDate::from_ymd_opt(2015, 12, 28).unwrap()
        );

        let monthly = t
            .count(
                None,
                false,
                &AggregateQuery {
                    resolution: Resolution::Month,
                    filters: logged_in(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(monthly.len(), 3);
    }

    #[test]
    fn test_count_with_bounds() {
        let t = tracker();
        t.create_table().unwrap();
        seed_logins(&t);

        let midnight =
            |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let left = t
            .count(
                None,
                false,
                &AggregateQuery {
                    resolution: Resolution::Week,
                    start: Some(midnight(2016, 2, 1)),
                    filters: vec![Filter::eq("event", "logged_in")],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(left.len(), 2);

        let right = t
            .count(
                None,
                false,
                &AggregateQuery {
                    resolution: Resolution::Week,
                    end: Some(midnight(2016, 2, 1)),
                    filters: vec![Filter::eq("event", "logged_in")],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(right.len(), 4);

        let full = t
            .count(
                None,
                false,
                &AggregateQuery {
                    start: Some(midnight(2016, 1, 15)),
                    end: Some(midnight(2016, 2, 15)),
                    filters: vec![Filter::eq("event", "logged_in")],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(full.len(), 2);
    }

    #[test]
    fn test_sum_and_average() {
        let t = tracker();
        t.create_table().unwrap();
        seed_logins(&t);

        let val = FieldPath::parse("metadata__val");

        let sum_all = t.sum(&val, &AggregateQuery::default()).unwrap();
        let sums: Vec<f64> = sum_all.iter().map(|b| b.value).collect();
        assert_eq!(sums, vec![3.0, 2.0, 1.0, 1.0, 1.0, 2.0, 3.0]);

        let sum_logins = t
            .sum(
                &val,
                &AggregateQuery {
                    filters: vec![Filter::eq("event", "logged_in")],
                    ..Default::default()
                },
            )
            .unwrap();
        let sums: Vec<f64> = sum_logins.iter().map(|b| b.value).collect();
        assert_eq!(sums, vec![3.0, 2.0, 1.0, 1.0, 1.0, 2.0, 2.0]);

        let avg = t
            .average(
                &val,
                &AggregateQuery {
                    filters: vec![Filter::eq("event", "logged_in")],
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(avg.iter().all(|b| b.value == 1.0));
    }

    #[test]
    fn test_json_field_access() {
        let t = tracker();
        t.create_table().unwrap();

        t.write(&[("event", json!("maths")), ("metadata", json!({"integral": "derivative"}))])
            .unwrap();
        t.write(&[
            ("event", json!("stats")),
            ("metadata", json!({"montecarlo": {"prior": "likelihood"}})),
        ])
        .unwrap();
        t.write(&[
            ("event", json!("ml")),
            (
                "metadata",
                json!({
                    "deepnet": ["mlp", "cnn", "rnn"],
                    "ensembles": {
                        "random": "forest",
                        "always": {"cross_validate": ["kfold", "stratified"]}
                    }
                }),
            ),
        ])
        .unwrap();

        let maths_all = t
            .read_fields(&[FieldPath::parse("metadata__integral")], false, &[])
            .unwrap();
        assert_eq!(maths_all.len(), 3);
        assert_eq!(maths_all[0][0], json!("derivative"));
        assert_eq!(maths_all[1][0], Value::Null);

        let maths_condition = t
            .read_fields(
                &[FieldPath::parse("metadata__integral")],
                false,
                &[Filter::eq("event", "maths")],
            )
            .unwrap();
        assert_eq!(maths_condition.len(), 1);

        let prior = t
            .read_fields(
                &[FieldPath::parse("metadata__montecarlo__prior")],
                false,
                &[Filter::eq("event", "stats")],
            )
            .unwrap();
        assert_eq!(prior[0][0], json!("likelihood"));

        let best_nn = t
            .read_fields(
                &[FieldPath::parse("metadata__deepnet__1")],
                false,
                &[Filter::eq("event", "ml")],
            )
            .unwrap();
        assert_eq!(best_nn[0][0], json!("cnn"));

        let full_depth = t
            .read_fields(
                &[FieldPath::parse("metadata__ensembles__always__cross_validate__0")],
                false,
                &[Filter::eq("event", "ml")],
            )
            .unwrap();
        assert_eq!(full_depth[0][0], json!("kfold"));
    }

    #[test]
    fn test_json_maths() {
        let t = tracker();
        t.create_table().unwrap();

        for (value, lagavulin) in [(123, json!([4, 2])), (456, json!([5, 0])), (758, json!([7, 10]))]
        {
            t.write(&[
                ("event", json!("whisky")),
                ("metadata", json!({"uigeadail": {"value": value, "lagavulin": lagavulin}})),
            ])
            .unwrap();
        }

        assert_eq!(t.read(&[]).unwrap().len(), 3);
        assert_eq!(
            t.read(&[Filter::contains("metadata__uigeadail", "lagavulin")])
                .unwrap()
                .len(),
            3
        );
        assert_eq!(
            t.read(&[Filter::gt("metadata__uigeadail__value", 123)]).unwrap().len(),
            2
        );
        assert_eq!(
            t.read(&[Filter::gte("metadata__uigeadail__value", 123)]).unwrap().len(),
            3
        );

        let whiskies = t
            .sum(
                &FieldPath::parse("metadata__uigeadail__value"),
                &AggregateQuery::default(),
            )
            .unwrap();
        assert_eq!(whiskies.len(), 1);
        assert_eq!(whiskies[0].value, 1337.0);
    }

    #[test]
    fn test_disabled_tracker_swallows_writes() {
        let t = Tracker::disabled();
        t.write(&[("event", json!("this will fail silently"))]).unwrap();
    }

    #[test]
    fn test_partially_configured_tracker_fails_loudly() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let t = Tracker {
            table: None,
            ..Tracker::new(db, "events")
        };
        assert!(t.write(&[("event", json!("going_to_fail"))]).is_err());
    }

    #[test]
    fn test_write_to_missing_table_fails_loudly() {
        let t = tracker();
        assert!(t.write(&[("event", json!("no table yet"))]).is_err());
    }

    #[test]
    fn test_auto_timestamp() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let schema: TableSchema = vec![
            ("event".to_string(), "TEXT".to_string()),
            ("timestamp".to_string(), "DATETIME".to_string()),
        ];

        let no_auto = Tracker::new(Arc::clone(&db), "no_auto")
            .with_schema(schema.clone())
            .with_auto_timestamp(false);
        let auto = Tracker::new(db, "auto").with_schema(schema);

        no_auto.create_table().unwrap();
        auto.create_table().unwrap();

        no_auto.write(&[("event", json!("foo"))]).unwrap();
        auto.write(&[("event", json!("bar"))]).unwrap();

        let no_auto_rows = no_auto
            .read_fields(&[FieldPath::column("timestamp")], false, &[])
            .unwrap();
        assert_eq!(no_auto_rows[0][0], Value::Null);

        let auto_rows = auto
            .read_fields(&[FieldPath::column("timestamp")], false, &[])
            .unwrap();
        assert_ne!(auto_rows[0][0], Value::Null);
    }

    #[test]
    fn test_last_entry_cursor() {
        let t = tracker();
        assert_eq!(t.last_entry("timestamp").unwrap(), None);

        t.create_table().unwrap();
        assert_eq!(t.last_entry("timestamp").unwrap(), None);

        t.write(&[("timestamp", ts(2016, 1, 1, 9, 0)), ("user_id", json!("a"))])
            .unwrap();
        t.write(&[("timestamp", ts(2016, 1, 2, 9, 0)), ("user_id", json!("b"))])
            .unwrap();
        assert_eq!(
            t.last_entry("timestamp").unwrap(),
            Some(json!("2016-01-02 09:00:00"))
        );
    }

    #[test]
    fn test_write_batch_is_atomic() {
        let t = tracker();
        t.create_table().unwrap();

        let rows: Vec<Vec<(String, Value)>> = vec![
            vec![("user_id".to_string(), json!("a"))],
            // Unknown column makes the second insert fail.
            vec![("no_such_column".to_string(), json!("b"))],
        ];
        assert!(t.write_batch(&rows).is_err());
        assert_eq!(t.read(&[]).unwrap().len(), 0);
    }

    #[test]
    fn test_distinct_values() {
        let t = tracker();
        t.create_table().unwrap();
        t.write(&[("user_id", json!("a"))]).unwrap();
        t.write(&[("user_id", json!("a"))]).unwrap();
        t.write(&[("user_id", json!("b"))]).unwrap();
        t.write(&[("event", json!("anonymous"))]).unwrap();

        let mut users: Vec<String> = t
            .distinct_values(&FieldPath::column("user_id"), &[])
            .unwrap()
            .into_iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();
        users.sort();
        assert_eq!(users, vec!["a", "b"]);
    }
}
