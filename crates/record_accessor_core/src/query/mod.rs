//! SQL statement builders.
//!
//! # Responsibility
//! - Render the accessor's statement shapes for each supported dialect.
//! - Collect bound parameters in placeholder order.
//!
//! # Invariants
//! - Values are never formatted into SQL text; every value is a `?` parameter.
//! - Column identifiers are backtick-quoted with embedded backticks doubled.
//! - The table identifier is emitted verbatim; callers own its validity.

use crate::model::record::{Record, SqlValue};

/// SQL flavor a statement is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

/// Whether a statement returns rows or reports affected rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
    kind: StatementKind,
}

impl Statement {
    /// Wraps caller-provided SQL, classifying it by its leading keyword.
    pub fn raw(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        let sql = sql.into();
        let kind = classify(&sql);
        Self { sql, params, kind }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }
}

const READ_KEYWORDS: &[&str] = &["SELECT", "SHOW", "WITH", "PRAGMA", "EXPLAIN", "DESCRIBE", "VALUES"];

fn classify(sql: &str) -> StatementKind {
    let keyword = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default();

    if READ_KEYWORDS
        .iter()
        .any(|read| keyword.eq_ignore_ascii_case(read))
    {
        StatementKind::Read
    } else {
        StatementKind::Write
    }
}

/// Quotes a column identifier for both supported dialects.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn quoted_columns(record: &Record) -> Vec<String> {
    record.columns().map(quote_ident).collect()
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

/// `SELECT * FROM t WHERE `a` = ? AND `b` = ?`
pub fn select_equal(table: &str, criteria: &Record) -> Statement {
    let predicates = quoted_columns(criteria)
        .into_iter()
        .map(|column| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ");

    Statement {
        sql: format!("SELECT * FROM {table} WHERE {predicates}"),
        params: criteria.values().cloned().collect(),
        kind: StatementKind::Read,
    }
}

/// `INSERT INTO t (`a`,`b`) VALUES (?,?)`
pub fn insert_values(table: &str, data: &Record) -> Statement {
    Statement {
        sql: format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            quoted_columns(data).join(","),
            placeholders(data.len())
        ),
        params: data.values().cloned().collect(),
        kind: StatementKind::Write,
    }
}

/// Insert used by find-or-create.
///
/// MySQL renders the assignment form `INSERT INTO t SET `a` = ?, `b` = ?`;
/// SQLite has no such form and falls back to [`insert_values`].
pub fn insert_assignments(dialect: Dialect, table: &str, data: &Record) -> Statement {
    match dialect {
        Dialect::MySql => Statement {
            sql: format!("INSERT INTO {table} SET {}", assignments(data)),
            params: data.values().cloned().collect(),
            kind: StatementKind::Write,
        },
        Dialect::Sqlite => insert_values(table, data),
    }
}

/// Atomic insert-or-update of `data`.
///
/// MySQL: `INSERT ... VALUES (?,?) ON DUPLICATE KEY UPDATE `a` = ?, `b` = ?`,
/// binding every value twice.
/// SQLite: `INSERT ... VALUES (?,?) ON CONFLICT DO UPDATE SET `a` = excluded.`a``.
pub fn upsert(dialect: Dialect, table: &str, data: &Record) -> Statement {
    let insert = insert_values(table, data);
    match dialect {
        Dialect::MySql => {
            let mut params = insert.params;
            params.extend(data.values().cloned());
            Statement {
                sql: format!("{} ON DUPLICATE KEY UPDATE {}", insert.sql, assignments(data)),
                params,
                kind: StatementKind::Write,
            }
        }
        Dialect::Sqlite => {
            let updates = quoted_columns(data)
                .into_iter()
                .map(|column| format!("{column} = excluded.{column}"))
                .collect::<Vec<_>>()
                .join(", ");
            Statement {
                sql: format!("{} ON CONFLICT DO UPDATE SET {updates}", insert.sql),
                params: insert.params,
                kind: StatementKind::Write,
            }
        }
    }
}

fn assignments(data: &Record) -> String {
    quoted_columns(data)
        .into_iter()
        .map(|column| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::{
        insert_assignments, insert_values, quote_ident, select_equal, upsert, Dialect, Statement,
        StatementKind,
    };
    use crate::model::record::{Record, SqlValue};

    #[test]
    fn select_equal_joins_every_column_with_and() {
        let criteria = Record::new().with("id", 5).with("email", "a@b.com");
        let statement = select_equal("users", &criteria);

        assert_eq!(
            statement.sql(),
            "SELECT * FROM users WHERE `id` = ? AND `email` = ?"
        );
        assert_eq!(
            statement.params(),
            &[SqlValue::Integer(5), SqlValue::Text("a@b.com".to_string())]
        );
        assert_eq!(statement.kind(), StatementKind::Read);
    }

    #[test]
    fn mysql_find_or_create_insert_uses_set_form() {
        let data = Record::new().with("email", "a@b.com").with("name", "Ann");
        let statement = insert_assignments(Dialect::MySql, "users", &data);

        assert_eq!(
            statement.sql(),
            "INSERT INTO users SET `email` = ?, `name` = ?"
        );
        assert_eq!(statement.params().len(), 2);
    }

    #[test]
    fn sqlite_find_or_create_insert_uses_values_form() {
        let data = Record::new().with("email", "a@b.com");
        assert_eq!(
            insert_assignments(Dialect::Sqlite, "users", &data),
            insert_values("users", &data)
        );
    }

    #[test]
    fn mysql_upsert_binds_values_for_insert_and_update() {
        let data = Record::new().with("sku", "x-1").with("qty", 3);
        let statement = upsert(Dialect::MySql, "stock", &data);

        assert_eq!(
            statement.sql(),
            "INSERT INTO stock (`sku`,`qty`) VALUES (?,?) ON DUPLICATE KEY UPDATE `sku` = ?, `qty` = ?"
        );
        assert_eq!(
            statement.params(),
            &[
                SqlValue::Text("x-1".to_string()),
                SqlValue::Integer(3),
                SqlValue::Text("x-1".to_string()),
                SqlValue::Integer(3),
            ]
        );
    }

    #[test]
    fn sqlite_upsert_updates_from_excluded_row() {
        let data = Record::new().with("sku", "x-1").with("qty", 3);
        let statement = upsert(Dialect::Sqlite, "stock", &data);

        assert_eq!(
            statement.sql(),
            "INSERT INTO stock (`sku`,`qty`) VALUES (?,?) ON CONFLICT DO UPDATE SET `sku` = excluded.`sku`, `qty` = excluded.`qty`"
        );
        assert_eq!(statement.params().len(), 2);
    }

    #[test]
    fn quoted_values_never_reach_sql_text() {
        let data = Record::new().with("name", "O'Brien'); DROP TABLE users; --");
        for statement in [
            insert_values("users", &data),
            upsert(Dialect::MySql, "users", &data),
            select_equal("users", &data),
        ] {
            assert!(!statement.sql().contains("O'Brien"));
            assert!(!statement.sql().contains('\''));
        }
    }

    #[test]
    fn identifiers_escape_backticks() {
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn raw_statements_are_classified_by_leading_keyword() {
        assert_eq!(Statement::raw("  select 1", vec![]).kind(), StatementKind::Read);
        assert_eq!(
            Statement::raw("(SELECT 1) UNION (SELECT 2)", vec![]).kind(),
            StatementKind::Read
        );
        assert_eq!(Statement::raw("SHOW TABLES", vec![]).kind(), StatementKind::Read);
        assert_eq!(
            Statement::raw("UPDATE users SET a = 1", vec![]).kind(),
            StatementKind::Write
        );
        assert_eq!(Statement::raw("", vec![]).kind(), StatementKind::Write);
    }
}
