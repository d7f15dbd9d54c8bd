//! Statement executors.
//!
//! Provides the [`Executor`] trait that abstracts synchronous statement
//! execution, the [`Row`] type returned by queries, and [`SqliteExecutor`],
//! the bundled implementation over `rusqlite`.
//!
//! Any other backend (a MySQL connection, a test double) plugs in by
//! implementing [`Executor`] and reporting its [`Dialect`].

use crate::value::{self, Record};
use rusqlite::types::Value as SqliteValue;
use sea_query::Value;
use std::cell::Cell;
use std::fmt;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Executor error type
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// SQLite error from `rusqlite`
    SqliteError(String),
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::SqliteError(e) => write!(f, "SQLite error: {e}"),
            ExecutorError::QueryError(s) => write!(f, "Query error: {s}"),
            ExecutorError::ParseError(s) => write!(f, "Parse error: {s}"),
            ExecutorError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for ExecutorError {}

impl From<rusqlite::Error> for ExecutorError {
    fn from(err: rusqlite::Error) -> Self {
        ExecutorError::SqliteError(err.to_string())
    }
}

/// SQL dialect spoken by an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    /// Quote an identifier; dotted names are quoted per segment
    pub fn escape_column(&self, name: &str) -> String {
        let (open, close) = match self {
            Dialect::Sqlite => ('"', '"'),
            Dialect::MySql => ('`', '`'),
        };
        name.split('.')
            .map(|part| {
                if part == "*" {
                    return part.to_string();
                }
                let doubled = part.replace(close, &format!("{close}{close}"));
                format!("{open}{doubled}{close}")
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Statement that opens a transaction
    pub fn begin_statement(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "BEGIN",
            Dialect::MySql => "START TRANSACTION",
        }
    }
}

/// A result row: ordered column names with their values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Value of the named column
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Value at a column position
    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_record(self) -> Record {
        self.columns.into_iter().zip(self.values).collect()
    }
}

/// Trait for executing statements
///
/// Implementations run one statement at a time, synchronously, on a single
/// connection. Parameters are bound positionally to `?` placeholders.
pub trait Executor {
    /// Dialect used to generate statements for this executor
    fn dialect(&self) -> Dialect;

    /// Execute a statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the statement fails.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError>;

    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the query fails or a column cannot be read.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError>;

    /// Row id generated by the most recent successful INSERT, if any
    fn last_insert_id(&self) -> Option<i64>;
}

/// Implementation of `Executor` for `rusqlite::Connection`
pub struct SqliteExecutor {
    conn: rusqlite::Connection,
    last_insert_id: Cell<Option<i64>>,
}

impl SqliteExecutor {
    /// Open an in-memory SQLite database
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened.
    pub fn open_in_memory() -> Result<Self, ExecutorError> {
        Ok(Self::new(rusqlite::Connection::open_in_memory()?))
    }

    /// Open (or create) a SQLite database file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, ExecutorError> {
        Ok(Self::new(rusqlite::Connection::open(path)?))
    }

    pub fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn,
            last_insert_id: Cell::new(None),
        }
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl Executor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        log::debug!("execute: {} ({} params)", sql, params.len());
        let bound: Vec<SqliteValue> = params.iter().map(to_sqlite_value).collect();
        let affected = self
            .conn
            .execute(sql, rusqlite::params_from_iter(bound.iter()))?;

        let is_insert = sql
            .trim_start()
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("insert"));
        if is_insert {
            self.last_insert_id.set(Some(self.conn.last_insert_rowid()));
        }
        Ok(affected as u64)
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        log::debug!("query: {} ({} params)", sql, params.len());
        let bound: Vec<SqliteValue> = params.iter().map(to_sqlite_value).collect();
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let col_count = columns.len();

        let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(col_count);
            for i in 0..col_count {
                let v: SqliteValue = row.get(i)?;
                values.push(from_sqlite_value(v));
            }
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id.get()
    }
}

/// Convert a `sea_query::Value` into a value `rusqlite` can bind
pub fn to_sqlite_value(value: &Value) -> SqliteValue {
    if value::is_null(value) {
        return SqliteValue::Null;
    }
    match value {
        Value::Float(_) | Value::Double(_) => SqliteValue::Real(value::as_f64(value)),
        Value::String(_) | Value::Char(_) | Value::Json(_) => {
            SqliteValue::Text(value::as_string(value))
        }
        Value::Bytes(Some(b)) => SqliteValue::Blob(b.to_vec()),
        other => SqliteValue::Integer(value::as_i64(other)),
    }
}

/// Convert a `rusqlite` value into a `sea_query::Value`
pub fn from_sqlite_value(value: SqliteValue) -> Value {
    match value {
        SqliteValue::Null => value::null(),
        SqliteValue::Integer(i) => Value::BigInt(Some(i)),
        SqliteValue::Real(f) => Value::Double(Some(f)),
        SqliteValue::Text(s) => Value::from(s),
        SqliteValue::Blob(b) => Value::from(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_column_per_dialect() {
        assert_eq!(Dialect::Sqlite.escape_column("name"), "\"name\"");
        assert_eq!(Dialect::MySql.escape_column("name"), "`name`");
        assert_eq!(Dialect::MySql.escape_column("t.name"), "`t`.`name`");
        assert_eq!(Dialect::MySql.escape_column("we`ird"), "`we``ird`");
        assert_eq!(Dialect::Sqlite.escape_column("t.*"), "\"t\".*");
    }

    #[test]
    fn test_sqlite_executor_roundtrip() {
        let exec = SqliteExecutor::open_in_memory().expect("open");
        exec.execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)", &[])
            .expect("create");
        let affected = exec
            .execute("INSERT INTO t (name) VALUES (?)", &[Value::from("a")])
            .expect("insert");
        assert_eq!(affected, 1);
        assert_eq!(exec.last_insert_id(), Some(1));

        let rows = exec
            .query("SELECT id, name FROM t WHERE name = ?", &[Value::from("a")])
            .expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::BigInt(Some(1))));
        assert_eq!(rows[0].get("name"), Some(&Value::from("a")));
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(to_sqlite_value(&Value::Bool(Some(true))), SqliteValue::Integer(1));
        assert_eq!(to_sqlite_value(&Value::Int(None)), SqliteValue::Null);
        assert_eq!(to_sqlite_value(&Value::Double(Some(1.5))), SqliteValue::Real(1.5));
        assert_eq!(from_sqlite_value(SqliteValue::Integer(3)), Value::BigInt(Some(3)));
    }

    #[test]
    fn test_executor_error_display() {
        let err = ExecutorError::QueryError("bad".to_string());
        assert_eq!(err.to_string(), "Query error: bad");
    }
}
