//! MySQL wire-protocol connection backed by sqlx.
//!
//! # Responsibility
//! - Speak the MySQL protocol for `ConnectionConfig::Mysql`.
//! - Keep the crate's blocking API by driving sqlx on a private runtime.
//!
//! # Invariants
//! - Each connection owns its own current-thread runtime; nothing is shared
//!   between connections.

use super::{Connection, DbError, DbResult, MySqlConfig, WriteOutcome};
use crate::format::format_for_storage;
use crate::model::record::{Record, SqlValue};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection as _, Row, TypeInfo, ValueRef};
use tokio::runtime::{Builder, Runtime};

pub struct MySqlConnection {
    runtime: Runtime,
    conn: sqlx::MySqlConnection,
}

impl MySqlConnection {
    pub fn open(config: &MySqlConfig) -> DbResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(DbError::Runtime)?;
        let options = connect_options(config);
        let conn = runtime.block_on(sqlx::MySqlConnection::connect_with(&options))?;
        Ok(Self { runtime, conn })
    }
}

fn connect_options(config: &MySqlConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user);
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(database) = &config.database {
        options = options.database(database);
    }
    if let Some(charset) = &config.charset {
        options = options.charset(charset);
    }
    if let Some(socket) = &config.socket {
        options = options.socket(socket);
    }
    options
}

fn bind_params<'q>(sql: &'q str, params: &'q [SqlValue]) -> Query<'q, MySql, MySqlArguments> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(value) => query.bind(*value),
            SqlValue::Real(value) => query.bind(*value),
            SqlValue::Text(value) => query.bind(value.as_str()),
            SqlValue::Blob(bytes) => query.bind(bytes.as_slice()),
        };
    }
    query
}

impl Connection for MySqlConnection {
    fn backend(&self) -> &'static str {
        "mysql"
    }

    fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Record>> {
        let Self { runtime, conn } = self;
        let rows = runtime.block_on(bind_params(sql, params).fetch_all(&mut *conn))?;
        rows.iter().map(decode_row).collect()
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<WriteOutcome> {
        let Self { runtime, conn } = self;
        let result = runtime.block_on(bind_params(sql, params).execute(&mut *conn))?;

        Ok(WriteOutcome {
            affected_rows: result.rows_affected(),
            last_insert_id: generated_insert_id(result.last_insert_id()),
        })
    }

    fn close(self: Box<Self>) -> DbResult<()> {
        let Self { runtime, conn } = *self;
        runtime.block_on(conn.close())?;
        Ok(())
    }
}

/// MySQL reports 0 when the statement generated no AUTO_INCREMENT value.
fn generated_insert_id(raw: u64) -> Option<i64> {
    match raw {
        0 => None,
        id => i64::try_from(id).ok(),
    }
}

fn decode_row(row: &MySqlRow) -> DbResult<Record> {
    let mut record = Record::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            decode_column(row, index, &type_name)?
        };
        record.insert(column.name(), value);
    }
    Ok(record)
}

fn decode_column(row: &MySqlRow, index: usize, type_name: &str) -> Result<SqlValue, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => SqlValue::from(row.try_get::<bool, _>(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            SqlValue::Integer(row.try_get::<i64, _>(index)?)
        }
        name if name.ends_with("UNSIGNED") => {
            let value = row.try_get::<u64, _>(index)?;
            i64::try_from(value).map_or_else(|_| SqlValue::Text(value.to_string()), SqlValue::Integer)
        }
        "FLOAT" => SqlValue::Real(f64::from(row.try_get::<f32, _>(index)?)),
        "DOUBLE" => SqlValue::Real(row.try_get::<f64, _>(index)?),
        "DATETIME" | "TIMESTAMP" => {
            SqlValue::Text(format_for_storage(&row.try_get::<NaiveDateTime, _>(index)?))
        }
        "DATE" => SqlValue::Text(row.try_get::<NaiveDate, _>(index)?.format("%Y-%m-%d").to_string()),
        "TIME" => SqlValue::Text(row.try_get::<NaiveTime, _>(index)?.format("%H:%M:%S").to_string()),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            SqlValue::Blob(row.try_get::<Vec<u8>, _>(index)?)
        }
        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" => {
            SqlValue::Text(row.try_get::<String, _>(index)?)
        }
        // DECIMAL, JSON, ENUM, SET and friends arrive as text on the wire.
        _ => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{connect_options, generated_insert_id, MySqlConnection};
    use crate::db::{open_connection, ConnectionConfig, DbError, MySqlConfig};
    use crate::repo::accessor::{AccessError, RecordAccessor, Table};
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn connect_options_follow_the_config() {
        let mut config = MySqlConfig::new("db.internal", "app")
            .with_password("s3cret")
            .with_database("shop");
        config.port = 3307;
        config.charset = Some("latin1".to_string());

        let options = connect_options(&config);
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "app");
        assert_eq!(options.get_database(), Some("shop"));
        assert_eq!(options.get_charset(), "latin1");
        assert!(options.get_socket().is_none());
    }

    #[test]
    fn socket_and_defaults_are_passed_through() {
        let mut config = MySqlConfig::new("localhost", "app");
        config.socket = Some("/var/run/mysqld/mysqld.sock".into());

        let options = connect_options(&config);
        assert_eq!(options.get_port(), 3306);
        assert_eq!(options.get_database(), None);
        assert_eq!(
            options.get_socket().map(|path| path.as_path()),
            Some(Path::new("/var/run/mysqld/mysqld.sock"))
        );
    }

    #[test]
    fn zero_insert_id_means_none_was_generated() {
        assert_eq!(generated_insert_id(0), None);
        assert_eq!(generated_insert_id(42), Some(42));
        assert_eq!(generated_insert_id(u64::MAX), None);
    }

    fn refused_config() -> MySqlConfig {
        // Nothing listens on port 1, so the connect is refused immediately.
        let mut config = MySqlConfig::new("127.0.0.1", "app");
        config.port = 1;
        config
    }

    #[test]
    fn refused_connect_surfaces_driver_error() {
        assert!(matches!(
            MySqlConnection::open(&refused_config()),
            Err(DbError::MySql(_))
        ));

        let config = ConnectionConfig::Mysql(refused_config());
        assert!(matches!(open_connection(&config), Err(DbError::MySql(_))));
    }

    #[test]
    fn accessor_reports_refused_connect_as_db_error() {
        let users = RecordAccessor::new(Table::new("users", refused_config()));

        let err = users.find_equal(&json!({"id": 1})).unwrap_err();
        assert!(matches!(err, AccessError::Db(DbError::MySql(_))));
        assert!(!err.is_no_result());
    }
}
