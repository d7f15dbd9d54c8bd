//! Tables and the storage contract models consume.
//!
//! [`Table`] binds a name and a set of [`Column`]s to a shared
//! [`Database`]. Statements are generated with SeaQuery for the database's
//! [`Dialect`]; WHERE clauses come from the crate's own
//! [`Condition`](crate::query::condition::Condition) tree and are injected as
//! custom expressions with bound values.
//!
//! Dialect-specific work (live schema introspection and `synchronize`) lives
//! in the `sqlite` and `mysql` submodules.
//!
//! # Examples
//!
//! ```
//! use rowkeeper::{Column, ColumnType, Database, Query, Table};
//! use rowkeeper::config::DatabaseConfig;
//! use rowkeeper::value::record;
//!
//! let db = Database::connect(&DatabaseConfig::default()).unwrap();
//! let users = Table::new(db, "users", vec![
//!     Column::new("id", ColumnType::Integer).primary_key().auto_increment(),
//!     Column::new("name", ColumnType::String),
//! ]);
//! users.create(false).unwrap();
//! users.insert(&record([("name", "Alice".into())])).unwrap();
//! assert_eq!(users.count_rows(&Query::all()).unwrap(), 1);
//! ```

use crate::database::Database;
use crate::error::{OrmError, Result};
use crate::executor::{Dialect, Row};
use crate::query::column::{Column, ColumnType};
use crate::query::{Columns, Filter, Query};
use crate::value::{self, Record};
use sea_query::{Expr, Index, SelectStatement, TableCreateStatement, Value};
use std::rc::Rc;

/// Build a SeaQuery statement for the given dialect
macro_rules! build_for {
    ($dialect:expr, $stmt:expr) => {
        match $dialect {
            Dialect::Sqlite => $stmt.build(sea_query::SqliteQueryBuilder),
            Dialect::MySql => $stmt.build(sea_query::MysqlQueryBuilder),
        }
    };
}

mod mysql;
mod sqlite;

/// Key-value storage contract used by models
///
/// Every call is addressed by a [`Query`]. `set` is an upsert: rows matched
/// by the query are updated, otherwise the value is inserted.
pub trait Storage {
    fn name(&self) -> &str;

    fn columns(&self) -> &[Column];

    /// Primary-key column names, in declaration order
    fn primary_key(&self) -> Vec<String> {
        self.columns()
            .iter()
            .filter(|c| c.is_primary_key())
            .map(|c| c.name().to_string())
            .collect()
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.columns().iter().find(|c| c.name() == name)
    }

    fn get(&self, query: &Query) -> Result<Vec<Record>>;

    fn set(&self, query: &Query, values: &Record) -> Result<bool>;

    fn isset(&self, query: &Query) -> Result<bool>;

    fn unset(&self, query: &Query) -> Result<bool>;

    fn count(&self, query: &Query) -> Result<u64>;

    fn insert(&self, values: &Record) -> Result<u64>;

    fn update(&self, filter: &Filter, values: &Record) -> Result<u64>;

    /// Id generated by the last insert, if this storage generates ids
    fn last_insert_id(&self) -> Option<i64>;
}

/// Column as reported by the live schema
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LiveColumn {
    pub name: String,
    pub family: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}

/// Difference between declared columns and the live schema
#[derive(Debug, Default)]
pub(crate) struct SchemaDiff<'a> {
    pub added: Vec<&'a Column>,
    pub modified: Vec<&'a Column>,
    pub removed: Vec<String>,
    pub primary_key_changed: bool,
}

impl SchemaDiff<'_> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.removed.is_empty()
            && !self.primary_key_changed
    }
}

/// A named table on a shared database
#[derive(Debug, Clone)]
pub struct Table {
    db: Rc<Database>,
    name: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(db: Rc<Database>, name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            db,
            name: name.into(),
            columns,
        }
    }

    pub fn database(&self) -> &Rc<Database> {
        &self.db
    }

    pub fn dialect(&self) -> Dialect {
        self.db.dialect()
    }

    pub fn escape_column(&self, name: &str) -> String {
        self.db.escape_column(name)
    }

    /// Create the table from its columns
    ///
    /// With `replace` an existing table is dropped first; otherwise the
    /// statement is `CREATE TABLE IF NOT EXISTS`.
    pub fn create(&self, replace: bool) -> Result<bool> {
        if replace {
            self.drop()?;
        }
        let stmt = self.create_statement(&self.name, !replace)?;
        let sql = build_for!(self.dialect(), stmt);
        self.db.execute(&sql, &[])?;
        log::info!("created table {}", self.name);
        Ok(true)
    }

    /// Bring the live schema in line with the declared columns
    pub fn synchronize(&self) -> Result<bool> {
        match self.dialect() {
            Dialect::Sqlite => sqlite::synchronize(self),
            Dialect::MySql => mysql::synchronize(self),
        }
    }

    pub fn drop(&self) -> Result<bool> {
        let stmt = sea_query::Table::drop()
            .table(self.name.clone())
            .if_exists()
            .to_owned();
        let sql = build_for!(self.dialect(), stmt);
        self.db.execute(&sql, &[])?;
        Ok(true)
    }

    pub fn select(&self, query: &Query) -> Result<Vec<Record>> {
        let stmt = self.select_statement(query)?;
        let (sql, values) = build_for!(self.dialect(), stmt);
        let rows = self.db.query(&sql, &values.0)?;
        Ok(rows
            .into_iter()
            .map(|row| self.format_row(row, query.get_columns()))
            .collect())
    }

    /// # Errors
    ///
    /// `EmptyValues` if `values` is empty, `UnknownColumn` for a field the
    /// table does not declare.
    pub fn insert(&self, values: &Record) -> Result<u64> {
        let values = self.prepare_values("insert", values)?;
        let (columns, exprs): (Vec<String>, Vec<Expr>) =
            values.into_iter().map(|(c, v)| (c, Expr::val(v))).unzip();

        let mut stmt = sea_query::Query::insert();
        stmt.into_table(self.name.clone()).columns(columns);
        stmt.values(exprs)
            .map_err(|e| OrmError::Statement(e.to_string()))?;
        let (sql, params) = build_for!(self.dialect(), stmt);
        self.db.execute(&sql, &params.0)
    }

    /// # Errors
    ///
    /// `EmptyValues` if `values` is empty, `UnknownColumn` for a field the
    /// table does not declare.
    pub fn update(&self, filter: &Filter, values: &Record) -> Result<u64> {
        let values = self.prepare_values("update", values)?;
        let mut stmt = sea_query::Query::update();
        stmt.table(self.name.clone());
        for (column, v) in values {
            stmt.value(column, Expr::val(v));
        }
        if let Some(expr) = self.where_expr(filter)? {
            stmt.and_where(expr);
        }
        let (sql, params) = build_for!(self.dialect(), stmt);
        self.db.execute(&sql, &params.0)
    }

    pub fn delete(&self, filter: &Filter) -> Result<u64> {
        let mut stmt = sea_query::Query::delete();
        stmt.from_table(self.name.clone());
        if let Some(expr) = self.where_expr(filter)? {
            stmt.and_where(expr);
        }
        let (sql, params) = build_for!(self.dialect(), stmt);
        self.db.execute(&sql, &params.0)
    }

    pub fn exists(&self, filter: &Filter) -> Result<bool> {
        let mut stmt = sea_query::Query::select();
        stmt.expr(Expr::cust("1")).from(self.name.clone()).limit(1);
        if let Some(expr) = self.where_expr(filter)? {
            stmt.and_where(expr);
        }
        let (sql, params) = build_for!(self.dialect(), stmt);
        Ok(!self.db.query(&sql, &params.0)?.is_empty())
    }

    /// Number of rows (or groups) matched by the query
    pub fn count_rows(&self, query: &Query) -> Result<u64> {
        let base = query.without_columns();
        let (sql, params) = if base.get_group().is_empty() {
            let mut stmt = sea_query::Query::select();
            stmt.expr_as(Expr::cust("COUNT(*)"), "count".to_string())
                .from(self.name.clone());
            if let Some(expr) = self.where_expr(base.get_filter())? {
                stmt.and_where(expr);
            }
            let (sql, values) = build_for!(self.dialect(), stmt);
            (sql, values.0)
        } else {
            let group = base.get_group().to_vec();
            let inner = self.select_statement(&base.select(group))?;
            let (sql, values) = build_for!(self.dialect(), inner);
            (
                format!(
                    "SELECT COUNT(*) AS {} FROM ({}) AS {}",
                    self.escape_column("count"),
                    sql,
                    self.escape_column("grouped")
                ),
                values.0,
            )
        };
        let rows = self.db.query(&sql, &params)?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count").or_else(|| row.get_index(0)))
            .map(|v| value::as_i64(v).max(0) as u64)
            .unwrap_or(0))
    }

    pub(crate) fn create_statement(
        &self,
        name: &str,
        if_not_exists: bool,
    ) -> Result<TableCreateStatement> {
        if self.columns.is_empty() {
            return Err(OrmError::Statement(format!(
                "table {} declares no columns",
                self.name
            )));
        }
        let primary_key = Storage::primary_key(self);
        let inline_key = primary_key.len() == 1;

        let mut stmt = sea_query::Table::create();
        stmt.table(name.to_string());
        if if_not_exists {
            stmt.if_not_exists();
        }
        for column in &self.columns {
            let mut def = column.to_column_def(self.dialect(), inline_key);
            stmt.col(&mut def);
        }
        if primary_key.len() > 1 {
            let mut index = Index::create();
            for key in primary_key {
                index.col(key);
            }
            stmt.primary_key(&mut index);
        }
        Ok(stmt)
    }

    pub(crate) fn diff<'a>(&'a self, live: &[LiveColumn]) -> SchemaDiff<'a> {
        let mut diff = SchemaDiff::default();
        for column in &self.columns {
            match live.iter().find(|l| l.name == column.name()) {
                None => diff.added.push(column),
                Some(l) => {
                    if l.family != column.column_type().family()
                        || l.nullable != column.is_nullable()
                    {
                        diff.modified.push(column);
                    }
                }
            }
        }
        diff.removed = live
            .iter()
            .filter(|l| self.columns.iter().all(|c| c.name() != l.name))
            .map(|l| l.name.clone())
            .collect();

        let declared_key = Storage::primary_key(self);
        let live_key: Vec<String> = live
            .iter()
            .filter(|l| l.primary_key)
            .map(|l| l.name.clone())
            .collect();
        diff.primary_key_changed = declared_key != live_key;
        diff
    }

    fn select_statement(&self, query: &Query) -> Result<SelectStatement> {
        let mut stmt = sea_query::Query::select();
        stmt.from(self.name.clone());
        match query.get_columns() {
            Columns::All => {
                stmt.column(sea_query::Asterisk);
            }
            Columns::List(columns) => {
                for column in columns {
                    stmt.column(column.clone());
                }
            }
            Columns::Aliased(pairs) => {
                for (column, alias) in pairs {
                    stmt.expr_as(Expr::col(column.clone()), alias.clone());
                }
            }
        }
        if let Some(expr) = self.where_expr(query.get_filter())? {
            stmt.and_where(expr);
        }
        for column in query.get_group() {
            stmt.group_by_col(column.clone());
        }
        for (column, direction) in query.get_order() {
            stmt.order_by(column.clone(), (*direction).into());
        }
        if let Some(limit) = query.get_limit() {
            stmt.limit(limit.amount());
            if limit.offset() > 0 {
                stmt.offset(limit.offset());
            }
        }
        Ok(stmt)
    }

    fn where_expr(&self, filter: &Filter) -> Result<Option<Expr>> {
        let condition = filter.to_condition()?;
        if condition.is_empty() {
            return Ok(None);
        }
        let (sql, values) = condition.to_placeholders(&|c| self.escape_column(c));
        Ok(Some(Expr::cust_with_values(sql, values)))
    }

    /// Format outgoing values through their columns
    fn prepare_values(&self, operation: &'static str, values: &Record) -> Result<Vec<(String, Value)>> {
        if values.is_empty() {
            return Err(OrmError::EmptyValues {
                operation,
                table: self.name.clone(),
            });
        }
        let mut out = Vec::with_capacity(values.len());
        for (name, raw) in values {
            if self.columns.is_empty() {
                out.push((name.clone(), raw.clone()));
                continue;
            }
            let column = Storage::column(self, name).ok_or_else(|| OrmError::UnknownColumn {
                table: self.name.clone(),
                column: name.clone(),
            })?;
            if column.is_auto_increment() && value::is_null_like(raw) {
                continue;
            }
            out.push((name.clone(), column.format(raw)));
        }
        if out.is_empty() {
            return Err(OrmError::EmptyValues {
                operation,
                table: self.name.clone(),
            });
        }
        Ok(out)
    }

    /// Format a fetched row through the declared columns
    fn format_row(&self, row: Row, requested: &Columns) -> Record {
        row.into_record()
            .into_iter()
            .map(|(name, raw)| {
                let formatted = match Storage::column(self, requested.source_of(&name)) {
                    Some(column) => column.format(&raw),
                    None => raw,
                };
                (name, formatted)
            })
            .collect()
    }
}

impl Storage for Table {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn get(&self, query: &Query) -> Result<Vec<Record>> {
        self.select(query)
    }

    fn set(&self, query: &Query, values: &Record) -> Result<bool> {
        if self.isset(query)? {
            self.update(query.get_filter(), values)?;
        } else {
            self.insert(values)?;
        }
        Ok(true)
    }

    fn isset(&self, query: &Query) -> Result<bool> {
        self.exists(query.get_filter())
    }

    fn unset(&self, query: &Query) -> Result<bool> {
        Ok(self.delete(query.get_filter())? > 0)
    }

    fn count(&self, query: &Query) -> Result<u64> {
        self.count_rows(query)
    }

    fn insert(&self, values: &Record) -> Result<u64> {
        Table::insert(self, values)
    }

    fn update(&self, filter: &Filter, values: &Record) -> Result<u64> {
        Table::update(self, filter, values)
    }

    fn last_insert_id(&self) -> Option<i64> {
        if self
            .columns
            .iter()
            .any(|c| c.is_primary_key() && c.is_auto_increment())
        {
            self.db.last_insert_id()
        } else {
            None
        }
    }
}
