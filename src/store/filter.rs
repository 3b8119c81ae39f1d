//! Typed query predicates.
//!
//! Filters pair a [`FieldPath`] with a comparison and compile to a SQL
//! fragment plus bound parameters.

use super::path::FieldPath;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// Comparison applied to a field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Equality
    Eq(Value),
    /// Strictly greater than
    Gt(Value),
    /// Greater than or equal
    Gte(Value),
    /// Strictly less than
    Lt(Value),
    /// Less than or equal
    Lte(Value),
    /// Set membership
    In(Vec<Value>),
    /// Key/element membership for JSON targets, substring otherwise
    Contains(String),
}

/// A single WHERE-clause predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Field the predicate applies to
    pub path: FieldPath,
    /// The comparison
    pub predicate: Predicate,
}

impl Filter {
    /// `path = value`
    pub fn eq(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            predicate: Predicate::Eq(value.into()),
        }
    }

    /// `path > value`
    pub fn gt(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            predicate: Predicate::Gt(value.into()),
        }
    }

    /// `path >= value`
    pub fn gte(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            predicate: Predicate::Gte(value.into()),
        }
    }

    /// `path < value`
    pub fn lt(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            predicate: Predicate::Lt(value.into()),
        }
    }

    /// `path <= value`
    pub fn lte(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            predicate: Predicate::Lte(value.into()),
        }
    }

    /// `path IN (values...)`
    pub fn is_in<V: Into<Value>>(path: impl Into<FieldPath>, values: Vec<V>) -> Self {
        Self {
            path: path.into(),
            predicate: Predicate::In(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Membership test. For the JSON metadata column this matches object
    /// keys and array elements; for plain columns it is a substring match.
    pub fn contains(path: impl Into<FieldPath>, needle: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            predicate: Predicate::Contains(needle.into()),
        }
    }

    /// Compile to a SQL fragment and its bound parameters.
    ///
    /// `json_field` names the table's JSON column, which switches the
    /// semantics of `Contains`.
    pub(crate) fn sql(&self, json_field: &str) -> (String, Vec<SqlValue>) {
        let target = self.path.sql();
        match &self.predicate {
            Predicate::Eq(v) => (format!("{target} = ?"), vec![to_sql_value(v)]),
            Predicate::Gt(v) => (format!("{target} > ?"), vec![to_sql_value(v)]),
            Predicate::Gte(v) => (format!("{target} >= ?"), vec![to_sql_value(v)]),
            Predicate::Lt(v) => (format!("{target} < ?"), vec![to_sql_value(v)]),
            Predicate::Lte(v) => (format!("{target} <= ?"), vec![to_sql_value(v)]),
            Predicate::In(values) => {
                let placeholders = vec!["?"; values.len().max(1)].join(", ");
                let params = if values.is_empty() {
                    // IN () is a syntax error; bind NULL, which matches nothing.
                    vec![SqlValue::Null]
                } else {
                    values.iter().map(to_sql_value).collect()
                };
                (format!("{target} IN ({placeholders})"), params)
            }
            Predicate::Contains(needle) => {
                if self.path.column_name() == json_field {
                    let clause = format!(
                        "EXISTS (SELECT 1 FROM json_each(CASE WHEN json_valid({target}) \
                         THEN {target} ELSE '{{}}' END) \
                         WHERE json_each.key = ? OR json_each.value = ?)"
                    );
                    (
                        clause,
                        vec![
                            SqlValue::Text(needle.clone()),
                            SqlValue::Text(needle.clone()),
                        ],
                    )
                } else {
                    (
                        format!("{target} LIKE '%' || ? || '%'"),
                        vec![SqlValue::Text(needle.clone())],
                    )
                }
            }
        }
    }
}

/// Render a WHERE clause for a set of filters.
pub(crate) fn where_clause(filters: &[Filter], json_field: &str) -> (String, Vec<SqlValue>) {
    if filters.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut clauses = Vec::with_capacity(filters.len());
    let mut params = Vec::new();
    for filter in filters {
        let (clause, mut values) = filter.sql(json_field);
        clauses.push(clause);
        params.append(&mut values);
    }
    (format!(" WHERE {}", clauses.join(" AND ")), params)
}

/// Map a JSON value onto an SQLite parameter.
pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        // Arrays and objects are stored as JSON text.
        other => SqlValue::Text(other.to_string()),
    }
}
