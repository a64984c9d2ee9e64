//! Per-call connection bootstrap and scoped release.
//!
//! # Responsibility
//! - Open a fresh connection for the configured backend.
//! - Run one unit of work and close the connection on every exit path.
//!
//! # Invariants
//! - Opening never reuses an earlier connection.
//! - `with_connection` always attempts `close`, even when the work failed.

use super::sqlite::SqliteConnection;
use super::{Connection, ConnectionConfig, DbError, DbResult, MySqlConfig};
use crate::logging::sanitize_message;
use log::{debug, error, warn};
use std::time::Instant;

const MAX_LOGGED_ERROR_CHARS: usize = 240;

/// Opens one dedicated connection described by `config`.
///
/// # Side effects
/// - Performs a network or file open.
/// - Emits `db_open` logging events with duration and status.
pub fn open_connection(config: &ConnectionConfig) -> DbResult<Box<dyn Connection>> {
    let started_at = Instant::now();
    let backend = config.backend_name();
    debug!("event=db_open module=db status=start backend={backend}");

    let opened = match config {
        ConnectionConfig::Sqlite(sqlite) => {
            SqliteConnection::open(sqlite).map(|conn| Box::new(conn) as Box<dyn Connection>)
        }
        ConnectionConfig::Mysql(mysql) => open_mysql(mysql),
    };

    match opened {
        Ok(conn) => {
            debug!(
                "event=db_open module=db status=ok backend={backend} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error backend={backend} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
            );
            Err(err)
        }
    }
}

#[cfg(feature = "mysql")]
fn open_mysql(config: &MySqlConfig) -> DbResult<Box<dyn Connection>> {
    let conn = super::mysql::MySqlConnection::open(config)?;
    Ok(Box::new(conn))
}

#[cfg(not(feature = "mysql"))]
fn open_mysql(_config: &MySqlConfig) -> DbResult<Box<dyn Connection>> {
    Err(DbError::BackendUnavailable("mysql"))
}

/// Opens a connection, runs `work` on it, and closes it.
///
/// # Errors
/// - Returns the open error when no connection could be established.
/// - Returns the work error when `work` fails; a close failure on that path is
///   logged and dropped.
/// - Returns `DbError::Close` when `work` succeeded but closing failed.
pub fn with_connection<T>(
    config: &ConnectionConfig,
    work: impl FnOnce(&mut dyn Connection) -> DbResult<T>,
) -> DbResult<T> {
    let mut conn = open_connection(config)?;
    let backend = conn.backend();
    let outcome = work(conn.as_mut());
    let closed = conn.close();

    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(DbError::Close(Box::new(close_err))),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(
                "event=db_close module=db status=error backend={backend} error_code=db_close_failed error={}",
                sanitize_message(&close_err.to_string(), MAX_LOGGED_ERROR_CHARS)
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{open_connection, with_connection};
    use crate::db::{ConnectionConfig, DbError, MySqlConfig, SqliteConfig};

    #[test]
    fn failed_work_still_releases_the_connection() {
        let dir = tempfile::tempdir().unwrap();
        let config: ConnectionConfig = SqliteConfig::new(dir.path().join("scoped.db")).into();

        let err = with_connection(&config, |conn| {
            conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY);", &[])?;
            conn.execute("INSERT INTO missing_table VALUES (1);", &[])
        })
        .unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));

        let outcome = with_connection(&config, |conn| {
            conn.execute("INSERT INTO t (id) VALUES (1);", &[])
        })
        .expect("store should stay writable after a failed call");
        assert_eq!(outcome.affected_rows, 1);
    }

    #[test]
    fn missing_file_without_create_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut sqlite = SqliteConfig::new(dir.path().join("absent.db"));
        sqlite.create_if_missing = false;

        let err = open_connection(&sqlite.into()).err().expect("open should fail");
        assert!(matches!(err, DbError::Sqlite(_)));
    }

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn mysql_without_feature_reports_unavailable_backend() {
        let config: ConnectionConfig = MySqlConfig::new("localhost", "app").into();
        let err = open_connection(&config).err().expect("open should fail");
        assert!(matches!(err, DbError::BackendUnavailable("mysql")));
    }
}
