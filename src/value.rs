//! Dynamic field values.
//!
//! Rows and model data are carried as [`Record`]s: a column-name to
//! `sea_query::Value` map. The helpers here implement the loose scalar
//! coercions used by [`Column::format`](crate::query::column::Column::format)
//! and render values as SQL literals for [`Database::escape`](crate::Database::escape).

use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::Value;
use std::collections::BTreeMap;

/// Field data keyed by column name
pub type Record = BTreeMap<String, Value>;

static NUMERIC_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?").expect("numeric prefix regex")
});

/// Build a [`Record`] from `(column, value)` pairs
///
/// ```
/// use rowkeeper::value::record;
///
/// let data = record([("name", "Alice".into()), ("age", 30i64.into())]);
/// assert_eq!(data.len(), 2);
/// ```
pub fn record<K, I>(pairs: I) -> Record
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// The untyped null used where no column type is known
pub fn null() -> Value {
    Value::String(None)
}

/// Whether the value is any `None` variant
pub fn is_null(value: &Value) -> bool {
    match value {
        Value::Bool(v) => v.is_none(),
        Value::TinyInt(v) => v.is_none(),
        Value::SmallInt(v) => v.is_none(),
        Value::Int(v) => v.is_none(),
        Value::BigInt(v) => v.is_none(),
        Value::TinyUnsigned(v) => v.is_none(),
        Value::SmallUnsigned(v) => v.is_none(),
        Value::Unsigned(v) => v.is_none(),
        Value::BigUnsigned(v) => v.is_none(),
        Value::Float(v) => v.is_none(),
        Value::Double(v) => v.is_none(),
        Value::String(v) => v.is_none(),
        Value::Char(v) => v.is_none(),
        Value::Bytes(v) => v.is_none(),
        Value::Json(v) => v.is_none(),
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

/// Whether the value is null or the literal string `"null"`
pub fn is_null_like(value: &Value) -> bool {
    match value {
        Value::String(Some(s)) => s.eq_ignore_ascii_case("null"),
        other => is_null(other),
    }
}

/// Integer view of a value, following loose numeric coercion
///
/// Strings contribute their leading numeric prefix (`"12abc"` is 12,
/// `"abc"` is 0); floats truncate toward zero.
pub fn as_i64(value: &Value) -> i64 {
    match value {
        Value::Bool(Some(b)) => i64::from(*b),
        Value::TinyInt(Some(i)) => i64::from(*i),
        Value::SmallInt(Some(i)) => i64::from(*i),
        Value::Int(Some(i)) => i64::from(*i),
        Value::BigInt(Some(i)) => *i,
        Value::TinyUnsigned(Some(u)) => i64::from(*u),
        Value::SmallUnsigned(Some(u)) => i64::from(*u),
        Value::Unsigned(Some(u)) => i64::from(*u),
        Value::BigUnsigned(Some(u)) => i64::try_from(*u).unwrap_or(i64::MAX),
        Value::Float(Some(f)) => *f as i64,
        Value::Double(Some(d)) => *d as i64,
        Value::String(Some(s)) => parse_numeric_prefix(s) as i64,
        Value::Char(Some(c)) => c.to_digit(10).map_or(0, i64::from),
        _ => 0,
    }
}

/// Float view of a value, following loose numeric coercion
pub fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Float(Some(f)) => f64::from(*f),
        Value::Double(Some(d)) => *d,
        Value::String(Some(s)) => parse_numeric_prefix(s),
        other => as_i64(other) as f64,
    }
}

/// Boolean view of a value
///
/// Non-zero numbers and the strings `1`, `true`, `yes`, `on` are true.
pub fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(Some(b)) => *b,
        Value::Float(Some(f)) => *f != 0.0,
        Value::Double(Some(d)) => *d != 0.0,
        Value::String(Some(s)) => {
            matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ) || parse_numeric_prefix(s) != 0.0
        }
        other if is_null(other) => false,
        other => as_i64(other) != 0,
    }
}

/// String view of a value; null becomes the empty string
pub fn as_string(value: &Value) -> String {
    match value {
        Value::Bool(Some(b)) => if *b { "1" } else { "0" }.to_string(),
        Value::TinyInt(Some(i)) => i.to_string(),
        Value::SmallInt(Some(i)) => i.to_string(),
        Value::Int(Some(i)) => i.to_string(),
        Value::BigInt(Some(i)) => i.to_string(),
        Value::TinyUnsigned(Some(u)) => u.to_string(),
        Value::SmallUnsigned(Some(u)) => u.to_string(),
        Value::Unsigned(Some(u)) => u.to_string(),
        Value::BigUnsigned(Some(u)) => u.to_string(),
        Value::Float(Some(f)) => f.to_string(),
        Value::Double(Some(d)) => d.to_string(),
        Value::String(Some(s)) => s.to_string(),
        Value::Char(Some(c)) => c.to_string(),
        Value::Bytes(Some(b)) => String::from_utf8_lossy(b).into_owned(),
        Value::Json(Some(j)) => serde_json::to_string(j).unwrap_or_default(),
        _ => String::new(),
    }
}

fn parse_numeric_prefix(s: &str) -> f64 {
    NUMERIC_PREFIX
        .find(s)
        .and_then(|m| m.as_str().trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Render a value as a SQL literal
///
/// Strings are single-quoted with embedded quotes doubled; booleans render
/// as `1`/`0` so the literal is valid for both SQLite and MySQL.
pub fn sql_literal(value: &Value) -> String {
    if is_null(value) {
        return "NULL".to_string();
    }
    match value {
        Value::Bool(Some(b)) => if *b { "1" } else { "0" }.to_string(),
        Value::Float(_) | Value::Double(_) => as_string(value),
        Value::String(Some(s)) => format!("'{}'", s.replace('\'', "''")),
        Value::Char(Some(c)) => format!("'{}'", c.to_string().replace('\'', "''")),
        Value::Bytes(Some(b)) => {
            let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
            format!("X'{}'", hex)
        }
        Value::Json(Some(_)) => format!("'{}'", as_string(value).replace('\'', "''")),
        other => as_i64(other).to_string(),
    }
}

/// Value equality used for dirty tracking
///
/// Numeric variants compare by value, so `Int(5)` loaded from storage equals
/// `BigInt(5)` supplied by a caller.
pub fn same_value(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (is_null(a), is_null(b)) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        _ => {}
    }
    match (a, b) {
        (Value::String(_), Value::String(_)) => false,
        (Value::String(_), _) | (_, Value::String(_)) => as_string(a) == as_string(b),
        (Value::Float(_) | Value::Double(_), _) | (_, Value::Float(_) | Value::Double(_)) => {
            as_f64(a) == as_f64(b)
        }
        _ => as_i64(a) == as_i64(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_integer_coercion() {
        assert_eq!(as_i64(&Value::from("00")), 0);
        assert_eq!(as_i64(&Value::from("12abc")), 12);
        assert_eq!(as_i64(&Value::from("abc")), 0);
        assert_eq!(as_i64(&Value::from("-7.9")), -7);
        assert_eq!(as_i64(&Value::Bool(Some(true))), 1);
    }

    #[test]
    fn test_loose_bool_coercion() {
        assert!(as_bool(&Value::from("yes")));
        assert!(as_bool(&Value::from("2")));
        assert!(!as_bool(&Value::from("0")));
        assert!(!as_bool(&Value::from("")));
        assert!(as_bool(&Value::BigInt(Some(-1))));
    }

    #[test]
    fn test_sql_literal() {
        assert_eq!(sql_literal(&Value::Int(Some(42))), "42");
        assert_eq!(sql_literal(&Value::from("it's")), "'it''s'");
        assert_eq!(sql_literal(&Value::Bool(Some(true))), "1");
        assert_eq!(sql_literal(&Value::Int(None)), "NULL");
        assert_eq!(sql_literal(&Value::Bytes(Some(vec![0xab, 0x01]))), "X'ab01'");
    }

    #[test]
    fn test_same_value_across_variants() {
        assert!(same_value(&Value::Int(Some(5)), &Value::BigInt(Some(5))));
        assert!(same_value(&Value::Int(None), &Value::String(None)));
        assert!(!same_value(&Value::from("5"), &Value::from("05")));
        assert!(same_value(&Value::from("5"), &Value::BigInt(Some(5))));
        assert!(!same_value(&Value::Int(Some(1)), &Value::Int(None)));
    }

    #[test]
    fn test_null_like() {
        assert!(is_null_like(&Value::from("NULL")));
        assert!(is_null_like(&Value::Double(None)));
        assert!(!is_null_like(&Value::from("nil")));
    }
}
