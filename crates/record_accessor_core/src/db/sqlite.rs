//! SQLite connection backed by rusqlite.
//!
//! # Invariants
//! - Every opened handle has the configured busy timeout applied.
//! - Column order of fetched rows follows the statement's result columns.

use super::{Connection, DbError, DbResult, SqliteConfig, WriteOutcome};
use crate::model::record::{Record, SqlValue};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, OpenFlags};
use std::time::Duration;

pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn open(config: &SqliteConfig) -> DbResult<Self> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if config.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let conn = rusqlite::Connection::open_with_flags(&config.path, flags)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Ok(Self { conn })
    }
}

impl Connection for SqliteConnection {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sqlite_value)))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (index, name) in column_names.iter().enumerate() {
                record.insert(name.clone(), from_sqlite_value(row.get_ref(index)?));
            }
            records.push(record);
        }

        Ok(records)
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<WriteOutcome> {
        let rowid_before = self.conn.last_insert_rowid();
        let changed = self
            .conn
            .execute(sql, params_from_iter(params.iter().map(to_sqlite_value)))?;
        let rowid_after = self.conn.last_insert_rowid();

        Ok(WriteOutcome {
            affected_rows: changed as u64,
            last_insert_id: generated_rowid(rowid_before, rowid_after),
        })
    }

    fn close(self: Box<Self>) -> DbResult<()> {
        self.conn.close().map_err(|(_, err)| DbError::Sqlite(err))
    }
}

/// `last_insert_rowid` is connection-wide and untouched by updates, deletes and
/// `WITHOUT ROWID` inserts, so only a change counts as a generated id.
fn generated_rowid(before: i64, after: i64) -> Option<i64> {
    (after != before && after != 0).then_some(after)
}

fn to_sqlite_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::Integer(*value),
        SqlValue::Real(value) => Value::Real(*value),
        SqlValue::Text(value) => Value::Text(value.clone()),
        SqlValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

fn from_sqlite_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(value) => SqlValue::Integer(value),
        ValueRef::Real(value) => SqlValue::Real(value),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::{generated_rowid, SqliteConnection};
    use crate::db::{Connection, SqliteConfig};
    use crate::model::record::SqlValue;

    #[test]
    fn fetch_all_maps_every_storage_class() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = SqliteConnection::open(&SqliteConfig::new(dir.path().join("t.db"))).unwrap();

        conn.execute(
            "CREATE TABLE samples (i INTEGER, r REAL, t TEXT, b BLOB, n TEXT);",
            &[],
        )
        .unwrap();
        let written = conn
            .execute(
                "INSERT INTO samples (i, r, t, b, n) VALUES (?, ?, ?, ?, ?);",
                &[
                    SqlValue::Integer(42),
                    SqlValue::Real(1.5),
                    SqlValue::Text("it's".to_string()),
                    SqlValue::Blob(vec![0, 255]),
                    SqlValue::Null,
                ],
            )
            .unwrap();
        assert_eq!(written.affected_rows, 1);
        assert_eq!(written.last_insert_id, Some(1));

        let rows = conn.fetch_all("SELECT * FROM samples;", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["i", "r", "t", "b", "n"]);
        assert_eq!(row.get("i"), Some(&SqlValue::Integer(42)));
        assert_eq!(row.get("r"), Some(&SqlValue::Real(1.5)));
        assert_eq!(row.get("t"), Some(&SqlValue::Text("it's".to_string())));
        assert_eq!(row.get("b"), Some(&SqlValue::Blob(vec![0, 255])));
        assert_eq!(row.get("n"), Some(&SqlValue::Null));

        Box::new(conn).close().unwrap();
    }

    #[test]
    fn no_op_write_reports_no_insert_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = SqliteConnection::open(&SqliteConfig::new(dir.path().join("t.db"))).unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY);", &[])
            .unwrap();

        let outcome = conn.execute("DELETE FROM t WHERE id = ?;", &[SqlValue::Integer(9)]).unwrap();
        assert_eq!(outcome.affected_rows, 0);
        assert_eq!(outcome.last_insert_id, None);
    }

    #[test]
    fn updates_and_without_rowid_inserts_report_no_insert_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = SqliteConnection::open(&SqliteConfig::new(dir.path().join("t.db"))).unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);", &[])
            .unwrap();
        conn.execute(
            "CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT) WITHOUT ROWID;",
            &[],
        )
        .unwrap();

        let keyed = conn
            .execute("INSERT INTO kv (k, v) VALUES (?, ?);", &["a".into(), "1".into()])
            .unwrap();
        assert_eq!(keyed.affected_rows, 1);
        assert_eq!(keyed.last_insert_id, None);

        let inserted = conn
            .execute("INSERT INTO t (v) VALUES (?);", &["x".into()])
            .unwrap();
        assert_eq!(inserted.last_insert_id, Some(1));

        // The rowid from the previous insert must not leak into later writes.
        let updated = conn
            .execute("UPDATE t SET v = ? WHERE id = ?;", &["y".into(), 1.into()])
            .unwrap();
        assert_eq!(updated.affected_rows, 1);
        assert_eq!(updated.last_insert_id, None);

        let keyed_again = conn
            .execute("INSERT INTO kv (k, v) VALUES (?, ?);", &["b".into(), "2".into()])
            .unwrap();
        assert_eq!(keyed_again.last_insert_id, None);
    }

    #[test]
    fn generated_rowid_requires_a_fresh_non_zero_id() {
        assert_eq!(generated_rowid(0, 0), None);
        assert_eq!(generated_rowid(4, 4), None);
        assert_eq!(generated_rowid(0, 7), Some(7));
        assert_eq!(generated_rowid(7, 8), Some(8));
    }
}
