//! Generic table accessor over MySQL-compatible and SQLite stores.
//!
//! A concrete table type implements [`TableBinding`] and wraps itself in a
//! [`RecordAccessor`] to gain exact-match lookup, insert, upsert and
//! find-or-create helpers. Each call uses its own short-lived connection.

pub mod db;
pub mod format;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;

pub use db::{ConnectionConfig, DbError, MySqlConfig, SqliteConfig, WriteOutcome};
pub use format::{format_for_storage, format_str_for_storage, StorageDate};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::record::{AsRecord, Record, RecordShapeError, SqlValue};
pub use query::{Dialect, Statement, StatementKind};
pub use repo::accessor::{
    AccessError, AccessResult, QueryOutcome, RecordAccessor, Table, TableBinding,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
