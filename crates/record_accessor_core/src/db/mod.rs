//! Connection configuration and per-call connection lifecycle.
//!
//! # Responsibility
//! - Describe how to reach a store (`ConnectionConfig`).
//! - Open one dedicated connection per statement and release it on every path.
//! - Normalize backend driver errors into `DbError`.
//!
//! # Invariants
//! - No connection is pooled or reused across calls.
//! - A connection handed to `with_connection` work is closed before it returns,
//!   whether the work succeeded or failed.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod config;
mod connection;
#[cfg(feature = "mysql")]
pub mod mysql;
mod open;
pub mod sqlite;

pub use config::{ConfigError, ConnectionConfig, MySqlConfig, SqliteConfig};
pub use connection::{Connection, WriteOutcome};
pub use open::{open_connection, with_connection};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    #[cfg(feature = "mysql")]
    MySql(sqlx::Error),
    /// The async runtime driving the MySQL client could not be started.
    #[cfg(feature = "mysql")]
    Runtime(std::io::Error),
    /// The config names a backend this build was compiled without.
    BackendUnavailable(&'static str),
    /// The statement succeeded but releasing the connection failed.
    Close(Box<DbError>),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            #[cfg(feature = "mysql")]
            Self::MySql(err) => write!(f, "{err}"),
            #[cfg(feature = "mysql")]
            Self::Runtime(err) => write!(f, "failed to start mysql runtime: {err}"),
            Self::BackendUnavailable(backend) => write!(
                f,
                "backend `{backend}` is not compiled in; enable the `{backend}` feature"
            ),
            Self::Close(err) => write!(f, "failed to close connection: {err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            #[cfg(feature = "mysql")]
            Self::MySql(err) => Some(err),
            #[cfg(feature = "mysql")]
            Self::Runtime(err) => Some(err),
            Self::BackendUnavailable(_) => None,
            Self::Close(err) => Some(err.as_ref()),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[cfg(feature = "mysql")]
impl From<sqlx::Error> for DbError {
    fn from(value: sqlx::Error) -> Self {
        Self::MySql(value)
    }
}
