//! # footfall
//!
//! User event tracking with derived session and engagement analytics,
//! backed by SQLite.
//!
//! This library provides:
//! - An event store ([`Tracker`]) over one SQLite table, with typed
//!   filters, nested JSON field access, and time-bucketed aggregates
//! - Derived statistics ([`Statistics`]): inactivity-gap session
//!   segmentation and daily/weekly/monthly engagement
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through two layers:
//! - **Raw:** the event table, append-only, written by instrumented code
//! - **Derived:** companion tables (`<table>__sessions`,
//!   `<table>__engagement`), regenerable, computed incrementally from
//!   their own checkpoints
//!
//! ## Example
//!
//! ```rust,no_run
//! use footfall::{Config, Database, Statistics, Tracker};
//! use footfall::stats::{EngagementOptions, SessionOptions};
//! use std::sync::Arc;
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Arc::new(Database::open(&config.database_path()).expect("failed to open database"));
//!
//! let tracker = Tracker::from_config(db, &config);
//! tracker
//!     .write(&[
//!         ("user_id", serde_json::json!("frodo")),
//!         ("event", serde_json::json!("logged_in")),
//!     ])
//!     .expect("failed to record event");
//!
//! let stats = Statistics::new(tracker);
//! stats.compute_sessions(&SessionOptions::default()).expect("session run failed");
//! stats.compute_engagement(&EngagementOptions::default()).expect("engagement run failed");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use stats::Statistics;
pub use store::{AggregateQuery, Database, FieldPath, Filter, Predicate, Tracker};
pub use types::*;

// Public modules
pub mod config;
pub mod error;
pub mod logging;
pub mod stats;
pub mod store;
pub mod types;
