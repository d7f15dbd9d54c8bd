//! Query value objects.
//!
//! A [`Query`] bundles everything a storage call needs to address rows:
//! a [`Filter`], the requested [`Columns`], an optional [`Limit`], ordering
//! and grouping. Queries are immutable; builder methods return a new value.
//!
//! # Examples
//!
//! ```
//! use rowkeeper::query::{Direction, Filter, Query};
//! use rowkeeper::query::condition::Cond;
//!
//! let query = Query::new(Cond::gt("age", 18i64))
//!     .select(["id", "name"])
//!     .order_by("name", Direction::Asc)
//!     .range(20, 10);
//! assert_eq!(query.get_limit().map(|l| l.amount()), Some(10));
//! ```

pub mod column;
pub mod condition;

use crate::error::{OrmError, Result};
use crate::value::{self, Record};
use condition::Condition;
use sea_query::Value;

/// One entry of the conditions shorthand
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Raw SQL fragment
    Raw(String),
    /// `column = value`
    Eq(String, Value),
    /// `column IN (...)`
    In(String, Vec<Value>),
    /// `column IS NULL`
    IsNull(String),
    /// Equality against the JSON serialization of a structured value
    Serialized(String, serde_json::Value),
}

impl Criterion {
    fn column(&self) -> Option<&str> {
        match self {
            Criterion::Raw(_) => None,
            Criterion::Eq(c, _)
            | Criterion::In(c, _)
            | Criterion::IsNull(c)
            | Criterion::Serialized(c, _) => Some(c),
        }
    }

    fn to_condition(&self) -> Result<Condition> {
        let cond = Condition::new();
        Ok(match self {
            Criterion::Raw(sql) => cond.raw(sql.clone()),
            Criterion::Eq(c, v) => cond.column(c.clone()).eq(v.clone()),
            Criterion::In(c, values) => cond.column(c.clone()).is_in(values.clone())?,
            Criterion::IsNull(c) => cond.column(c.clone()).is_null(),
            Criterion::Serialized(c, v) => cond.column(c.clone()).eq(v.to_string()),
        })
    }
}

/// Row selection
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Every row
    #[default]
    All,
    /// Raw SQL WHERE body
    Raw(String),
    /// Shorthand criteria, AND-ed together
    Criteria(Vec<Criterion>),
    Condition(Condition),
}

impl Filter {
    /// Resolve to a single condition tree; empty means "no WHERE clause"
    ///
    /// # Errors
    ///
    /// `InvalidConditions` for blank raw fragments or criteria without a
    /// column name, `EmptyOperand` for an empty IN list.
    pub fn to_condition(&self) -> Result<Condition> {
        match self {
            Filter::All => Ok(Condition::new()),
            Filter::Raw(sql) if sql.trim().is_empty() => {
                Err(OrmError::InvalidConditions("blank raw condition".to_string()))
            }
            Filter::Raw(sql) => Ok(Condition::new().raw(sql.clone())),
            Filter::Criteria(criteria) => {
                let mut out = Condition::new();
                for criterion in criteria {
                    if criterion.column().is_some_and(|c| c.trim().is_empty()) {
                        return Err(OrmError::InvalidConditions(format!(
                            "criterion without column: {:?}",
                            criterion
                        )));
                    }
                    if !out.is_empty() {
                        out = out.and();
                    }
                    out = out.nested(criterion.to_condition()?);
                }
                Ok(out)
            }
            Filter::Condition(cond) => Ok(cond.clone()),
        }
    }
}

impl From<&str> for Filter {
    fn from(sql: &str) -> Self {
        Filter::Raw(sql.to_string())
    }
}

impl From<String> for Filter {
    fn from(sql: String) -> Self {
        Filter::Raw(sql)
    }
}

impl From<Condition> for Filter {
    fn from(cond: Condition) -> Self {
        Filter::Condition(cond)
    }
}

impl From<Vec<Criterion>> for Filter {
    fn from(criteria: Vec<Criterion>) -> Self {
        Filter::Criteria(criteria)
    }
}

/// Null values become `IS NULL`, everything else equality
impl From<Record> for Filter {
    fn from(record: Record) -> Self {
        Filter::Criteria(
            record
                .into_iter()
                .map(|(column, v)| {
                    if value::is_null(&v) {
                        Criterion::IsNull(column)
                    } else {
                        Criterion::Eq(column, v)
                    }
                })
                .collect(),
        )
    }
}

impl From<&Record> for Filter {
    fn from(record: &Record) -> Self {
        Filter::from(record.clone())
    }
}

/// Requested columns
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Columns {
    #[default]
    All,
    List(Vec<String>),
    /// `(column, alias)` pairs
    Aliased(Vec<(String, String)>),
}

impl Columns {
    /// Names the caller will see in returned rows; `None` for `All`
    pub fn names(&self) -> Option<Vec<String>> {
        match self {
            Columns::All => None,
            Columns::List(list) => Some(list.clone()),
            Columns::Aliased(pairs) => Some(pairs.iter().map(|(_, a)| a.clone()).collect()),
        }
    }

    /// Source column behind a returned name
    pub fn source_of<'a>(&'a self, name: &'a str) -> &'a str {
        match self {
            Columns::Aliased(pairs) => pairs
                .iter()
                .find(|(_, alias)| alias == name)
                .map(|(column, _)| column.as_str())
                .unwrap_or(name),
            _ => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Amount(u64),
    Range { offset: u64, amount: u64 },
}

impl Limit {
    pub fn amount(&self) -> u64 {
        match self {
            Limit::Amount(n) | Limit::Range { amount: n, .. } => *n,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            Limit::Amount(_) => 0,
            Limit::Range { offset, .. } => *offset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl From<Direction> for sea_query::Order {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Asc => sea_query::Order::Asc,
            Direction::Desc => sea_query::Order::Desc,
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(OrmError::InvalidConditions(format!(
                "unknown order direction `{}`",
                other
            ))),
        }
    }
}

/// Storage address: filter, columns, limit, order and group
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    filter: Filter,
    columns: Columns,
    limit: Option<Limit>,
    order: Vec<(String, Direction)>,
    group: Vec<String>,
}

impl Query {
    pub fn new(filter: impl Into<Filter>) -> Self {
        Self {
            filter: filter.into(),
            ..Self::default()
        }
    }

    /// Query over every row
    pub fn all() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: Columns) -> Self {
        self.columns = columns;
        self
    }

    pub fn select<S, I>(self, columns: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        self.columns(Columns::List(columns.into_iter().map(Into::into).collect()))
    }

    pub fn limit(mut self, amount: u64) -> Self {
        self.limit = Some(Limit::Amount(amount));
        self
    }

    pub fn range(mut self, offset: u64, amount: u64) -> Self {
        self.limit = Some(Limit::Range { offset, amount });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push((column.into(), direction));
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group.push(column.into());
        self
    }

    /// Same rows, no column list, limit or order (used for counting)
    pub fn without_columns(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            columns: Columns::All,
            limit: None,
            order: Vec::new(),
            group: self.group.clone(),
        }
    }

    pub fn get_filter(&self) -> &Filter {
        &self.filter
    }

    pub fn get_columns(&self) -> &Columns {
        &self.columns
    }

    pub fn get_limit(&self) -> Option<Limit> {
        self.limit
    }

    pub fn get_order(&self) -> &[(String, Direction)] {
        &self.order
    }

    pub fn get_group(&self) -> &[String] {
        &self.group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Dialect;
    use crate::value::record;

    fn render(filter: &Filter) -> (String, Vec<Value>) {
        filter
            .to_condition()
            .expect("valid filter")
            .to_placeholders(&|c| Dialect::Sqlite.escape_column(c))
    }

    #[test]
    fn test_criteria_shorthand() {
        let filter = Filter::Criteria(vec![
            Criterion::Raw("1 = 1".to_string()),
            Criterion::Eq("name".to_string(), Value::from("bob")),
            Criterion::In("id".to_string(), vec![Value::from(1i64), Value::from(2i64)]),
            Criterion::IsNull("deleted_at".to_string()),
            Criterion::Serialized("tags".to_string(), serde_json::json!(["a", "b"])),
        ]);
        let (sql, values) = render(&filter);
        assert_eq!(
            sql,
            "(1 = 1) AND (\"name\" = ?) AND (\"id\" IN (?, ?)) AND (\"deleted_at\" IS NULL) AND (\"tags\" = ?)"
        );
        assert_eq!(values.last(), Some(&Value::from(r#"["a","b"]"#)));
    }

    #[test]
    fn test_record_filter_maps_nulls() {
        let filter = Filter::from(record([("a", Value::from(1i64)), ("b", value::null())]));
        let (sql, values) = render(&filter);
        assert_eq!(sql, "(\"a\" = ?) AND (\"b\" IS NULL)");
        assert_eq!(values, vec![Value::from(1i64)]);
    }

    #[test]
    fn test_invalid_conditions() {
        assert!(matches!(
            Filter::Raw("  ".into()).to_condition(),
            Err(OrmError::InvalidConditions(_))
        ));
        assert!(matches!(
            Filter::Criteria(vec![Criterion::IsNull(String::new())]).to_condition(),
            Err(OrmError::InvalidConditions(_))
        ));
        assert!(matches!(
            Filter::Criteria(vec![Criterion::In("id".into(), vec![])]).to_condition(),
            Err(OrmError::EmptyOperand { .. })
        ));
    }

    #[test]
    fn test_without_columns_keeps_filter() {
        let query = Query::new("a > 1")
            .select(["a"])
            .limit(5)
            .order_by("a", Direction::Desc);
        let count = query.without_columns();
        assert_eq!(count.get_filter(), query.get_filter());
        assert_eq!(count.get_columns(), &Columns::All);
        assert_eq!(count.get_limit(), None);
        assert!(count.get_order().is_empty());
    }

    #[test]
    fn test_aliased_columns() {
        let cols = Columns::Aliased(vec![("full_name".into(), "name".into())]);
        assert_eq!(cols.names(), Some(vec!["name".to_string()]));
        assert_eq!(cols.source_of("name"), "full_name");
        assert_eq!(cols.source_of("other"), "other");
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("DESC".parse::<Direction>(), Ok(Direction::Desc));
        assert!("sideways".parse::<Direction>().is_err());
    }
}
