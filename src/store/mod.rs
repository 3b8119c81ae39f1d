//! Event store layer
//!
//! A [`Tracker`] owns one table in a SQLite [`Database`] and provides the
//! capability surface the stats engines consume: filtered reads,
//! time-bucketed aggregates, appends, DDL, and an incremental cursor.

mod db;
mod filter;
mod path;
mod tracker;

pub use db::Database;
pub use filter::{Filter, Predicate};
pub use path::{FieldPath, PathSegment};
pub use tracker::{AggregateQuery, Tracker};
