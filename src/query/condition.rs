//! Backend-independent condition trees.
//!
//! A [`Condition`] is an ordered list of typed [`Part`]s. Building it never
//! touches a database; rendering takes caller-supplied escape functions for
//! identifiers and values, so one tree can be rendered for SQLite, MySQL, or
//! as a parameterized string with `?` placeholders.
//!
//! ```
//! use rowkeeper::query::condition::{Cond, Condition};
//! use sea_query::Value;
//!
//! let cond = Cond::and_x([
//!     Cond::eq("a", 1i64),
//!     Cond::in_list("b", [1i64, 2, 3]).unwrap(),
//! ]);
//! let (sql, values) = cond.to_placeholders(&|c| format!("`{}`", c));
//! assert_eq!(sql.matches('?').count(), 4);
//! assert_eq!(values.len(), 4);
//! ```

use crate::error::{OrmError, Result};
use sea_query::Value;

/// Where `%` is added around a LIKE operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wildcard {
    #[default]
    None,
    Left,
    Right,
    Both,
}

impl Wildcard {
    fn apply(&self, value: &str) -> String {
        match self {
            Wildcard::None => value.to_string(),
            Wildcard::Left => format!("%{}", value),
            Wildcard::Right => format!("{}%", value),
            Wildcard::Both => format!("%{}%", value),
        }
    }
}

/// One element of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Identifier, escaped at render time
    Column(String),
    /// Single literal value
    Value(Value),
    /// Parenthesized value list for IN / NOT IN
    List(Vec<Value>),
    /// Operator or keyword (`=`, `IN`, `AND`, `IS NULL`, ...)
    Token(&'static str),
    /// Raw SQL fragment, emitted verbatim
    Raw(String),
    /// Sub-condition, rendered in parentheses
    Nested(Condition),
}

/// Chainable condition builder
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    parts: Vec<Part>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn push(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    fn compare(self, op: &'static str, value: impl Into<Value>) -> Self {
        self.push(Part::Token(op)).push(Part::Value(value.into()))
    }

    pub fn column(self, name: impl Into<String>) -> Self {
        self.push(Part::Column(name.into()))
    }

    pub fn raw(self, fragment: impl Into<String>) -> Self {
        self.push(Part::Raw(fragment.into()))
    }

    pub fn eq(self, value: impl Into<Value>) -> Self {
        self.compare("=", value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Self {
        self.compare("<>", value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.compare(">", value)
    }

    pub fn gte(self, value: impl Into<Value>) -> Self {
        self.compare(">=", value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.compare("<", value)
    }

    pub fn lte(self, value: impl Into<Value>) -> Self {
        self.compare("<=", value)
    }

    fn list<V, I>(self, op: &'static str, values: I) -> Result<Self>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(OrmError::EmptyOperand {
                operator: op,
                column: self.last_column().unwrap_or_default(),
            });
        }
        Ok(self.push(Part::Token(op)).push(Part::List(values)))
    }

    /// # Errors
    ///
    /// `EmptyOperand` if `values` is empty.
    pub fn is_in<V, I>(self, values: I) -> Result<Self>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.list("IN", values)
    }

    /// # Errors
    ///
    /// `EmptyOperand` if `values` is empty.
    pub fn not_in<V, I>(self, values: I) -> Result<Self>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.list("NOT IN", values)
    }

    pub fn like(self, value: &str, wildcard: Wildcard) -> Self {
        self.compare("LIKE", wildcard.apply(value))
    }

    pub fn not_like(self, value: &str, wildcard: Wildcard) -> Self {
        self.compare("NOT LIKE", wildcard.apply(value))
    }

    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push(Part::Token("BETWEEN"))
            .push(Part::Value(low.into()))
            .push(Part::Token("AND"))
            .push(Part::Value(high.into()))
    }

    pub fn is_null(self) -> Self {
        self.push(Part::Token("IS NULL"))
    }

    pub fn is_not_null(self) -> Self {
        self.push(Part::Token("IS NOT NULL"))
    }

    pub fn and(self) -> Self {
        self.push(Part::Token("AND"))
    }

    pub fn or(self) -> Self {
        self.push(Part::Token("OR"))
    }

    pub fn nested(self, condition: Condition) -> Self {
        self.push(Part::Nested(condition))
    }

    fn last_column(&self) -> Option<String> {
        self.parts.iter().rev().find_map(|p| match p {
            Part::Column(c) => Some(c.clone()),
            _ => None,
        })
    }

    /// Render with the given identifier and value escapers
    pub fn render(
        &self,
        escape_column: &dyn Fn(&str) -> String,
        escape_value: &mut dyn FnMut(&Value) -> String,
    ) -> String {
        let mut out: Vec<String> = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let piece = match part {
                Part::Column(name) => escape_column(name),
                Part::Value(v) => escape_value(v),
                Part::List(values) => {
                    let items: Vec<String> = values.iter().map(|v| escape_value(v)).collect();
                    format!("({})", items.join(", "))
                }
                Part::Token(token) => (*token).to_string(),
                Part::Raw(fragment) => fragment.clone(),
                Part::Nested(inner) => format!("({})", inner.render(escape_column, escape_value)),
            };
            out.push(piece);
        }
        out.join(" ")
    }

    /// Render with `?` placeholders, returning the bound values in order
    pub fn to_placeholders(&self, escape_column: &dyn Fn(&str) -> String) -> (String, Vec<Value>) {
        let mut values = Vec::new();
        let sql = self.render(escape_column, &mut |v: &Value| {
            values.push(v.clone());
            "?".to_string()
        });
        (sql, values)
    }
}

/// Shorthand constructors for whole conditions
pub struct Cond;

impl Cond {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Condition {
        Condition::new().column(column).eq(value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Condition {
        Condition::new().column(column).ne(value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Condition {
        Condition::new().column(column).gt(value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Condition {
        Condition::new().column(column).lt(value)
    }

    /// # Errors
    ///
    /// `EmptyOperand` if `values` is empty.
    pub fn in_list<V, I>(column: impl Into<String>, values: I) -> Result<Condition>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Condition::new().column(column).is_in(values)
    }

    pub fn is_null(column: impl Into<String>) -> Condition {
        Condition::new().column(column).is_null()
    }

    pub fn like(column: impl Into<String>, value: &str, wildcard: Wildcard) -> Condition {
        Condition::new().column(column).like(value, wildcard)
    }

    pub fn between(
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Condition {
        Condition::new().column(column).between(low, high)
    }

    /// All sub-conditions joined with AND
    pub fn and_x(conditions: impl IntoIterator<Item = Condition>) -> Condition {
        Self::join(conditions, "AND")
    }

    /// Any sub-condition, joined with OR
    pub fn or_x(conditions: impl IntoIterator<Item = Condition>) -> Condition {
        Self::join(conditions, "OR")
    }

    fn join(conditions: impl IntoIterator<Item = Condition>, token: &'static str) -> Condition {
        let mut out = Condition::new();
        for cond in conditions.into_iter().filter(|c| !c.is_empty()) {
            if !out.is_empty() {
                out = out.push(Part::Token(token));
            }
            out = out.nested(cond);
        }
        out
    }
}
