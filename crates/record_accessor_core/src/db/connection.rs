//! Backend-neutral connection contract.

use super::DbResult;
use crate::model::record::{Record, SqlValue};

/// Store-reported result of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Rows the store reports as inserted or updated.
    pub affected_rows: u64,
    /// Identifier generated by the statement, when the store reports one.
    pub last_insert_id: Option<i64>,
}

/// One open connection to a store.
///
/// Parameters are bound positionally to `?` placeholders.
pub trait Connection {
    /// Short backend name used in log events.
    fn backend(&self) -> &'static str;

    /// Runs a row-returning statement and collects every row.
    fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Record>>;

    /// Runs a statement that modifies data.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<WriteOutcome>;

    /// Releases the connection, reporting failures the drop path would hide.
    fn close(self: Box<Self>) -> DbResult<()>;
}
