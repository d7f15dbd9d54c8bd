//! Database handle shared by tables.
//!
//! A [`Database`] owns one [`Executor`] and the nested-transaction counter
//! for that connection. Tables hold it through `Rc<Database>`; execution is
//! single-threaded and request-scoped.

use crate::config::DatabaseConfig;
use crate::error::{OrmError, Result};
use crate::executor::{Dialect, Executor, Row, SqliteExecutor};
use crate::transaction::{Boundary, TransactionCounter};
use crate::value;
use sea_query::Value;
use std::cell::RefCell;
use std::rc::Rc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::tracing_helpers;
#[cfg(feature = "metrics")]
use std::time::Instant;

pub struct Database {
    executor: Box<dyn Executor>,
    transactions: RefCell<TransactionCounter>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.dialect())
            .field("transactions", &self.transactions.borrow())
            .finish()
    }
}

impl Database {
    pub fn new(executor: impl Executor + 'static) -> Self {
        Self {
            executor: Box::new(executor),
            transactions: RefCell::new(TransactionCounter::new()),
        }
    }

    /// Open the database named by the configuration
    ///
    /// # Errors
    ///
    /// `UnsupportedDriver` for urls without a bundled executor, or the
    /// executor error if the connection cannot be opened.
    pub fn connect(config: &DatabaseConfig) -> Result<Rc<Self>> {
        let url = config.url.as_str();
        let executor = if url == "sqlite::memory:" || url == "sqlite://:memory:" {
            SqliteExecutor::open_in_memory()?
        } else if let Some(path) = url.strip_prefix("sqlite://") {
            SqliteExecutor::open(path)?
        } else {
            return Err(OrmError::UnsupportedDriver(url.to_string()));
        };
        log::info!("connected to {}", url);
        Ok(Rc::new(Self::new(executor)))
    }

    pub fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        #[cfg(feature = "metrics")]
        let start = Instant::now();
        let result = self.executor.execute(sql, params);
        #[cfg(feature = "metrics")]
        record(start, result.is_err());
        Ok(result?)
    }

    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        #[cfg(feature = "metrics")]
        let start = Instant::now();
        let result = self.executor.query(sql, params);
        #[cfg(feature = "metrics")]
        record(start, result.is_err());
        Ok(result?)
    }

    pub fn last_insert_id(&self) -> Option<i64> {
        self.executor.last_insert_id()
    }

    /// Render a value as a SQL literal
    pub fn escape(&self, value: &Value) -> String {
        value::sql_literal(value)
    }

    /// Quote an identifier for this database's dialect
    pub fn escape_column(&self, name: &str) -> String {
        self.dialect().escape_column(name)
    }

    pub fn in_transaction(&self) -> bool {
        self.transactions.borrow().in_transaction()
    }

    pub fn transaction_depth(&self) -> u32 {
        self.transactions.borrow().depth()
    }

    /// Open a transaction, or a nested level of the open one
    pub fn begin_transaction(&self) -> Result<()> {
        let boundary = self.transactions.borrow_mut().begin();
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transaction_span("begin", self.transaction_depth()).entered();

        if boundary == Boundary::Begin {
            if let Err(e) = self.execute(self.dialect().begin_statement(), &[]) {
                self.transactions.borrow_mut().abort_begin();
                return Err(e);
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `RollbackOnly` if an inner level rolled back; the caller must then
    /// call [`roll_back`](Self::roll_back).
    pub fn commit(&self) -> Result<()> {
        let saved = self.transactions.borrow().clone();
        let boundary = self.transactions.borrow_mut().commit()?;
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transaction_span("commit", saved.depth()).entered();

        if boundary == Boundary::Commit {
            if let Err(e) = self.execute("COMMIT", &[]) {
                self.transactions.borrow_mut().restore(saved);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn roll_back(&self) -> Result<()> {
        let saved = self.transactions.borrow().clone();
        let boundary = self.transactions.borrow_mut().rollback()?;
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transaction_span("rollback", saved.depth()).entered();

        if boundary == Boundary::Rollback {
            if let Err(e) = self.execute("ROLLBACK", &[]) {
                self.transactions.borrow_mut().restore(saved);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run `f` inside a (possibly nested) transaction
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.begin_transaction()?;
        match f(self) {
            Ok(out) => match self.commit() {
                Ok(()) => Ok(out),
                Err(OrmError::RollbackOnly) => {
                    self.roll_back()?;
                    Err(OrmError::RollbackOnly)
                }
                Err(e) => Err(e),
            },
            Err(e) => {
                if let Err(rollback_err) = self.roll_back() {
                    log::warn!("rollback after failed transaction body: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(feature = "metrics")]
fn record(start: Instant, failed: bool) {
    if failed {
        METRICS.record_query_error();
    }
    METRICS.record_query(start.elapsed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;

    #[test]
    fn test_nested_transactions_issue_one_begin_and_commit() {
        let exec = RecordingExecutor::new(Dialect::MySql);
        let log = exec.log();
        let db = Database::new(exec);

        db.begin_transaction().expect("begin");
        db.begin_transaction().expect("begin nested");
        assert_eq!(db.transaction_depth(), 2);
        db.commit().expect("inner commit");
        assert!(db.in_transaction());
        db.commit().expect("outer commit");
        assert!(!db.in_transaction());

        assert_eq!(log.statements(), vec!["START TRANSACTION", "COMMIT"]);
    }

    #[test]
    fn test_inner_rollback_forces_outer_rollback() {
        let db = Database::new(RecordingExecutor::new(Dialect::Sqlite));
        db.begin_transaction().expect("begin");
        db.begin_transaction().expect("begin nested");
        db.roll_back().expect("inner rollback");
        assert_eq!(db.commit(), Err(OrmError::RollbackOnly));
        assert!(db.in_transaction());
        db.roll_back().expect("outer rollback");
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_failed_rollback_keeps_transaction_poisoned() {
        let exec = RecordingExecutor::new(Dialect::Sqlite).failing_on("ROLLBACK");
        let db = Database::new(exec);
        db.begin_transaction().expect("begin");
        db.begin_transaction().expect("begin nested");
        db.roll_back().expect("inner rollback");

        assert!(db.roll_back().is_err());
        assert_eq!(db.transaction_depth(), 1);
        assert_eq!(db.commit(), Err(OrmError::RollbackOnly));
    }

    #[test]
    fn test_rollback_without_transaction() {
        let db = Database::new(RecordingExecutor::new(Dialect::Sqlite));
        assert_eq!(db.roll_back(), Err(OrmError::NoActiveTransaction));
    }

    #[test]
    fn test_transaction_helper_rolls_back_on_error() {
        let exec = RecordingExecutor::new(Dialect::Sqlite);
        let log = exec.log();
        let db = Database::new(exec);

        let result: Result<()> = db.transaction(|_| Err(OrmError::Statement("nope".into())));
        assert!(result.is_err());
        assert_eq!(log.statements(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn test_connect_rejects_unknown_url() {
        let cfg = DatabaseConfig {
            url: "mysql://localhost/app".to_string(),
        };
        assert!(matches!(
            Database::connect(&cfg),
            Err(OrmError::UnsupportedDriver(_))
        ));
    }

    #[test]
    fn test_real_sqlite_transaction() {
        let db = Database::connect(&DatabaseConfig::default()).expect("connect");
        db.execute("CREATE TABLE t (v INTEGER)", &[]).expect("create");
        db.begin_transaction().expect("begin");
        db.execute("INSERT INTO t (v) VALUES (?)", &[Value::from(1i64)])
            .expect("insert");
        db.roll_back().expect("rollback");
        let rows = db.query("SELECT COUNT(*) AS n FROM t", &[]).expect("count");
        assert_eq!(rows[0].get("n"), Some(&Value::BigInt(Some(0))));
    }
}
