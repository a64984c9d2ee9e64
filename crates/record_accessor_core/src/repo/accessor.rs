//! Generic per-table record accessor.
//!
//! # Responsibility
//! - Turn flat records into equality lookups, inserts and upserts.
//! - Run each statement on its own scoped connection.
//! - Normalize driver output into a single row or a typed failure.
//!
//! # Invariants
//! - Input shape is validated before any connection is opened.
//! - Lookups succeed only when exactly one row matches.
//! - A write and its verification re-fetch use separate connections and are
//!   not atomic with respect to each other.

use crate::db::{with_connection, Connection, ConnectionConfig, DbError, DbResult, WriteOutcome};
use crate::format::{format_for_storage, StorageDate};
use crate::logging::sanitize_message;
use crate::model::record::{AsRecord, Record, RecordShapeError, SqlValue};
use crate::query::{self, Dialect, Statement, StatementKind};
use log::{debug, error};
use std::borrow::Cow;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const DEFAULT_ID_COLUMN: &str = "id";
const MAX_LOGGED_ERROR_CHARS: usize = 240;

pub type AccessResult<T> = Result<T, AccessError>;

/// Failure of an accessor operation.
#[derive(Debug)]
pub enum AccessError {
    /// An argument was not a non-empty mapping of scalars. Raised before any
    /// connection is opened.
    InvalidArgument {
        argument: &'static str,
        reason: RecordShapeError,
    },
    /// The lookup matched no row.
    NotFound,
    /// The lookup matched more than one row.
    Ambiguous { rows: usize },
    /// A write reported an affected-row count outside the accepted range.
    UnexpectedAffectedRows { affected: u64 },
    Db(DbError),
}

impl AccessError {
    /// True for the outcomes that mean "no definitive single row": not found,
    /// ambiguous, or a write that touched an unexpected number of rows.
    pub fn is_no_result(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Ambiguous { .. } | Self::UnexpectedAffectedRows { .. }
        )
    }
}

impl Display for AccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument { argument, reason } => {
                write!(f, "{argument} parameter should be a plain mapping: {reason}")
            }
            Self::NotFound => write!(f, "no row matched"),
            Self::Ambiguous { rows } => write!(f, "expected exactly one row, found {rows}"),
            Self::UnexpectedAffectedRows { affected } => {
                write!(f, "write affected an unexpected number of rows: {affected}")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidArgument { reason, .. } => Some(reason),
            Self::Db(err) => Some(err),
            Self::NotFound | Self::Ambiguous { .. } | Self::UnexpectedAffectedRows { .. } => None,
        }
    }
}

impl From<DbError> for AccessError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Raw result of [`RecordAccessor::run_query`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Vec<Record>),
    Written(WriteOutcome),
}

impl QueryOutcome {
    pub fn into_rows(self) -> Option<Vec<Record>> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Written(_) => None,
        }
    }

    pub fn written(&self) -> Option<WriteOutcome> {
        match self {
            Self::Rows(_) => None,
            Self::Written(outcome) => Some(*outcome),
        }
    }
}

/// Contract a concrete table type supplies to specialize the accessor.
pub trait TableBinding {
    /// Table identifier, emitted into SQL verbatim.
    fn table_name(&self) -> &str;

    fn connection_config(&self) -> &ConnectionConfig;

    /// Column holding the store-generated identifier.
    fn id_column(&self) -> &str {
        DEFAULT_ID_COLUMN
    }
}

/// Ready-made binding for callers that do not need their own type.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    config: ConnectionConfig,
    id_column: String,
}

impl Table {
    pub fn new(name: impl Into<String>, config: impl Into<ConnectionConfig>) -> Self {
        Self {
            name: name.into(),
            config: config.into(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
        }
    }

    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }
}

impl TableBinding for Table {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn connection_config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn id_column(&self) -> &str {
        &self.id_column
    }
}

/// CRUD helpers over one table.
///
/// Every operation opens a dedicated connection, runs one statement, and
/// closes the connection before returning.
pub struct RecordAccessor<B: TableBinding> {
    binding: B,
    table: String,
    dialect: Dialect,
}

impl<B: TableBinding> RecordAccessor<B> {
    /// Resolves the table identifier and dialect from `binding` once.
    pub fn new(binding: B) -> Self {
        let table = binding.table_name().to_string();
        let dialect = binding.connection_config().dialect();
        Self {
            binding,
            table,
            dialect,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    /// Executes `statement` on a fresh connection.
    ///
    /// Reads yield `QueryOutcome::Rows`, writes `QueryOutcome::Written`.
    ///
    /// # Errors
    /// - `AccessError::Db` for connect, execute or close failures; the failure
    ///   is logged here with the table and statement kind.
    pub fn run_query(&self, statement: &Statement) -> AccessResult<QueryOutcome> {
        match statement.kind() {
            StatementKind::Read => self.fetch(statement).map(QueryOutcome::Rows),
            StatementKind::Write => self.write(statement).map(QueryOutcome::Written),
        }
    }

    /// Runs caller-provided SQL with positional `?` parameters.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> AccessResult<QueryOutcome> {
        self.run_query(&Statement::raw(sql, params.to_vec()))
    }

    /// Returns the single row whose columns equal every entry of `criteria`.
    ///
    /// # Errors
    /// - `InvalidArgument` when `criteria` is not a non-empty flat mapping.
    /// - `NotFound` for zero matches, `Ambiguous` for two or more.
    pub fn find_equal<C: AsRecord + ?Sized>(&self, criteria: &C) -> AccessResult<Record> {
        let criteria = validated("criteria", criteria)?;
        self.find_exactly_one(&criteria)
    }

    /// Same as [`Self::find_equal`].
    pub fn find_one<C: AsRecord + ?Sized>(&self, criteria: &C) -> AccessResult<Record> {
        self.find_equal(criteria)
    }

    /// Returns the row equal to `data`, inserting it first when none exists.
    ///
    /// An existing row is returned unchanged. After an insert the row is
    /// re-fetched by the generated identifier, or by `data` when the store
    /// reports none.
    ///
    /// # Errors
    /// - `Ambiguous` when `data` already matches several rows; nothing is inserted.
    /// - `UnexpectedAffectedRows` when the insert did not affect exactly one row.
    pub fn find_or_create<D: AsRecord + ?Sized>(&self, data: &D) -> AccessResult<Record> {
        let data = validated("data", data)?;

        match self.find_exactly_one(&data) {
            Err(AccessError::NotFound) => {}
            found => return found,
        }

        let insert = query::insert_assignments(self.dialect, &self.table, &data);
        let written = self.write(&insert)?;
        if written.affected_rows != 1 {
            return Err(AccessError::UnexpectedAffectedRows {
                affected: written.affected_rows,
            });
        }

        match written.last_insert_id {
            Some(id) => {
                let by_id = Record::new().with(self.binding.id_column(), id);
                self.find_exactly_one(&by_id)
            }
            None => self.find_exactly_one(&data),
        }
    }

    /// Inserts `data`, updating the existing row on a key conflict, then
    /// returns the row matching `criteria`.
    ///
    /// `criteria` is caller-supplied and need not identify the written row.
    ///
    /// # Errors
    /// - `InvalidArgument` naming `data` or `where` for a malformed argument.
    /// - `UnexpectedAffectedRows` when the store reports no affected row
    ///   (MySQL reports 0 when the update changed nothing).
    pub fn insert_or_update<D, W>(&self, data: &D, criteria: &W) -> AccessResult<Record>
    where
        D: AsRecord + ?Sized,
        W: AsRecord + ?Sized,
    {
        let data = validated("data", data)?;
        let criteria = validated("where", criteria)?;

        let upsert = query::upsert(self.dialect, &self.table, &data);
        let written = self.write(&upsert)?;
        if written.affected_rows < 1 {
            return Err(AccessError::UnexpectedAffectedRows {
                affected: written.affected_rows,
            });
        }

        self.find_exactly_one(&criteria)
    }

    /// Inserts `data` and returns the row re-fetched by the same values.
    ///
    /// The re-fetch matches on `data` only, so it reports `Ambiguous` when an
    /// identical row already existed and `NotFound` when the store rewrote one
    /// of the inserted values.
    pub fn insert_one<D: AsRecord + ?Sized>(&self, data: &D) -> AccessResult<Record> {
        let data = validated("data", data)?;

        let insert = query::insert_values(&self.table, &data);
        let written = self.write(&insert)?;
        if written.affected_rows < 1 {
            return Err(AccessError::UnexpectedAffectedRows {
                affected: written.affected_rows,
            });
        }

        self.find_exactly_one(&data)
    }

    /// Formats `date` as `YYYY-MM-DD HH:mm:ss` for storage columns.
    pub fn format_for_storage<D: StorageDate + ?Sized>(&self, date: &D) -> String {
        format_for_storage(date)
    }

    fn find_exactly_one(&self, criteria: &Record) -> AccessResult<Record> {
        let statement = query::select_equal(&self.table, criteria);
        let mut rows = self.fetch(&statement)?;
        match rows.len() {
            0 => Err(AccessError::NotFound),
            1 => Ok(rows.remove(0)),
            count => Err(AccessError::Ambiguous { rows: count }),
        }
    }

    fn fetch(&self, statement: &Statement) -> AccessResult<Vec<Record>> {
        self.scoped(statement, |conn| {
            conn.fetch_all(statement.sql(), statement.params())
        })
    }

    fn write(&self, statement: &Statement) -> AccessResult<WriteOutcome> {
        self.scoped(statement, |conn| {
            conn.execute(statement.sql(), statement.params())
        })
    }

    fn scoped<T>(
        &self,
        statement: &Statement,
        work: impl FnOnce(&mut dyn Connection) -> DbResult<T>,
    ) -> AccessResult<T> {
        let started_at = Instant::now();
        let kind = statement.kind().as_str();

        match with_connection(self.binding.connection_config(), work) {
            Ok(value) => {
                debug!(
                    "event=query module=repo status=ok table={} kind={kind} params={} duration_ms={}",
                    self.table,
                    statement.params().len(),
                    started_at.elapsed().as_millis()
                );
                Ok(value)
            }
            Err(err) => {
                error!(
                    "event=query module=repo status=error table={} kind={kind} duration_ms={} error={}",
                    self.table,
                    started_at.elapsed().as_millis(),
                    sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
                );
                Err(err.into())
            }
        }
    }
}

fn validated<'a, T: AsRecord + ?Sized>(
    argument: &'static str,
    input: &'a T,
) -> AccessResult<Cow<'a, Record>> {
    input
        .as_record()
        .map_err(|reason| AccessError::InvalidArgument { argument, reason })
}

#[cfg(test)]
mod tests {
    use super::{AccessError, RecordAccessor, Table, TableBinding};
    use crate::db::{ConnectionConfig, SqliteConfig};
    use crate::query::Dialect;
    use serde_json::json;

    struct Users {
        config: ConnectionConfig,
    }

    impl TableBinding for Users {
        fn table_name(&self) -> &str {
            "users"
        }

        fn connection_config(&self) -> &ConnectionConfig {
            &self.config
        }
    }

    #[test]
    fn binding_is_resolved_once_at_construction() {
        let accessor = RecordAccessor::new(Users {
            config: SqliteConfig::new("/nonexistent/app.db").into(),
        });
        assert_eq!(accessor.table(), "users");
        assert_eq!(accessor.dialect(), Dialect::Sqlite);
        assert_eq!(accessor.binding().id_column(), "id");
    }

    #[test]
    fn where_and_data_arguments_report_distinct_messages() {
        let accessor = RecordAccessor::new(Table::new(
            "users",
            SqliteConfig::new("/nonexistent/dir/app.db"),
        ));

        let data_err = accessor
            .insert_or_update(&json!("nope"), &json!({"id": 1}))
            .unwrap_err();
        let where_err = accessor
            .insert_or_update(&json!({"id": 1}), &json!(["nope"]))
            .unwrap_err();

        assert!(data_err.to_string().starts_with("data parameter"));
        assert!(where_err.to_string().starts_with("where parameter"));
        assert!(matches!(where_err, AccessError::InvalidArgument { argument: "where", .. }));
    }

    #[test]
    fn no_result_classification() {
        assert!(AccessError::NotFound.is_no_result());
        assert!(AccessError::Ambiguous { rows: 2 }.is_no_result());
        assert!(AccessError::UnexpectedAffectedRows { affected: 0 }.is_no_result());
        assert!(!AccessError::Db(crate::db::DbError::BackendUnavailable("mysql")).is_no_result());
    }
}
