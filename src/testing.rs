//! Test doubles.
//!
//! [`RecordingExecutor`] records every statement it is given and answers
//! queries from a queue of canned rows. It lets tests assert on generated
//! SQL for either dialect and on whether a write happened at all.

use crate::executor::{Dialect, Executor, ExecutorError, Row};
use sea_query::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// One recorded statement
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// Whether the statement reads only (SELECT, PRAGMA, SHOW)
    pub fn is_read(&self) -> bool {
        let head = self
            .sql
            .trim_start()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        matches!(head.as_str(), "SELECT" | "PRAGMA" | "SHOW")
    }
}

/// Shared handle on the statements an executor has seen
#[derive(Debug, Clone, Default)]
pub struct StatementLog(Rc<RefCell<Vec<Statement>>>);

impl StatementLog {
    pub fn all(&self) -> Vec<Statement> {
        self.0.borrow().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.0.borrow().iter().map(|s| s.sql.clone()).collect()
    }

    /// Statements that are not plain reads
    pub fn writes(&self) -> Vec<Statement> {
        self.0.borrow().iter().filter(|s| !s.is_read()).cloned().collect()
    }

    pub fn reads(&self) -> Vec<Statement> {
        self.0.borrow().iter().filter(|s| s.is_read()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    fn push(&self, sql: &str, params: &[Value]) {
        self.0.borrow_mut().push(Statement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
    }
}

/// Executor that records statements instead of running them
pub struct RecordingExecutor {
    dialect: Dialect,
    log: StatementLog,
    responses: Rc<RefCell<VecDeque<Vec<Row>>>>,
    next_insert_id: Cell<Option<i64>>,
    last_insert_id: Cell<Option<i64>>,
    affected: Cell<u64>,
    failing_on: Option<String>,
}

impl RecordingExecutor {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            log: StatementLog::default(),
            responses: Rc::new(RefCell::new(VecDeque::new())),
            next_insert_id: Cell::new(None),
            last_insert_id: Cell::new(None),
            affected: Cell::new(1),
            failing_on: None,
        }
    }

    pub fn log(&self) -> StatementLog {
        self.log.clone()
    }

    /// Handle for queueing query answers after the executor has been moved
    pub fn responses(&self) -> ResponseQueue {
        ResponseQueue(Rc::clone(&self.responses))
    }

    /// Report generated ids starting at `first`, one per INSERT
    pub fn with_insert_ids(self, first: i64) -> Self {
        self.next_insert_id.set(Some(first));
        self
    }

    /// Rows-affected count reported for every write
    pub fn with_affected(self, affected: u64) -> Self {
        self.affected.set(affected);
        self
    }

    /// Fail every write whose SQL starts with `prefix` (case-insensitive)
    pub fn failing_on(mut self, prefix: &str) -> Self {
        self.failing_on = Some(prefix.to_ascii_uppercase());
        self
    }
}

/// Queue of canned query results, consumed in order
#[derive(Debug, Clone)]
pub struct ResponseQueue(Rc<RefCell<VecDeque<Vec<Row>>>>);

impl ResponseQueue {
    pub fn push(&self, rows: Vec<Row>) {
        self.0.borrow_mut().push_back(rows);
    }
}

impl Executor for RecordingExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError> {
        self.log.push(sql, params);
        let head = sql.trim_start().to_ascii_uppercase();
        if let Some(prefix) = &self.failing_on {
            if head.starts_with(prefix.as_str()) {
                return Err(ExecutorError::QueryError(format!("refused: {sql}")));
            }
        }
        if head.starts_with("INSERT") {
            if let Some(id) = self.next_insert_id.get() {
                self.last_insert_id.set(Some(id));
                self.next_insert_id.set(Some(id + 1));
            }
        }
        Ok(self.affected.get())
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        self.log.push(sql, params);
        Ok(self.responses.borrow_mut().pop_front().unwrap_or_default())
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id.get()
    }
}

/// Build a row from `(column, value)` pairs
pub fn row<I>(pairs: I) -> Row
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    let (columns, values): (Vec<String>, Vec<Value>) =
        pairs.into_iter().map(|(c, v)| (c.to_string(), v)).unzip();
    Row::new(columns, values)
}
