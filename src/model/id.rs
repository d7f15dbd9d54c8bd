//! Model identifiers.

use crate::value::{self, Record};
use sea_query::Value;

/// Identifier of a model's row
///
/// `Single` for one-column keys, `Composite` for an explicit column map,
/// `Positional` for key values in primary-key declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum Id {
    Single(Value),
    Composite(Record),
    Positional(Vec<Value>),
}

impl Id {
    /// Expand to a `{key column: value}` map
    ///
    /// Returns `None` when the id does not fit the given primary key.
    pub fn normalize(&self, primary_key: &[String]) -> Option<Record> {
        match self {
            Id::Single(v) => match primary_key {
                [key] => Some(Record::from([(key.clone(), v.clone())])),
                _ => None,
            },
            Id::Composite(map) if primary_key.is_empty() => Some(map.clone()),
            Id::Composite(map) => {
                let fits = map.len() == primary_key.len()
                    && primary_key.iter().all(|k| map.contains_key(k));
                fits.then(|| map.clone())
            }
            Id::Positional(values) => (values.len() == primary_key.len() && !values.is_empty())
                .then(|| primary_key.iter().cloned().zip(values.iter().cloned()).collect()),
        }
    }

    /// Whether the id carries no value at all
    pub fn is_null(&self) -> bool {
        match self {
            Id::Single(v) => value::is_null(v),
            Id::Composite(map) => map.is_empty() || map.values().all(value::is_null),
            Id::Positional(values) => values.is_empty() || values.iter().all(value::is_null),
        }
    }

    /// Id from the key fields of a row, if all are present and non-null
    pub fn from_fields(data: &Record, primary_key: &[String]) -> Option<Id> {
        let mut found = Record::new();
        for key in primary_key {
            match data.get(key) {
                Some(v) if !value::is_null(v) => {
                    found.insert(key.clone(), v.clone());
                }
                _ => return None,
            }
        }
        match primary_key {
            [] => None,
            [key] => found.remove(key).map(Id::Single),
            _ => Some(Id::Composite(found)),
        }
    }
}

impl From<Value> for Id {
    fn from(v: Value) -> Self {
        Id::Single(v)
    }
}

impl From<i64> for Id {
    fn from(v: i64) -> Self {
        Id::Single(Value::from(v))
    }
}

impl From<i32> for Id {
    fn from(v: i32) -> Self {
        Id::Single(Value::from(i64::from(v)))
    }
}

impl From<&str> for Id {
    fn from(v: &str) -> Self {
        Id::Single(Value::from(v))
    }
}

impl From<String> for Id {
    fn from(v: String) -> Self {
        Id::Single(Value::from(v))
    }
}

impl From<Record> for Id {
    fn from(map: Record) -> Self {
        Id::Composite(map)
    }
}

impl From<Vec<Value>> for Id {
    fn from(values: Vec<Value>) -> Self {
        Id::Positional(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::record;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single() {
        assert_eq!(
            Id::from(5i64).normalize(&keys(&["id"])),
            Some(record([("id", Value::from(5i64))]))
        );
        assert_eq!(Id::from(5i64).normalize(&keys(&["a", "b"])), None);
    }

    #[test]
    fn test_composite_must_match_key_set() {
        let id = Id::from(record([("a", Value::from(1i64)), ("b", Value::from("x"))]));
        assert!(id.normalize(&keys(&["b", "a"])).is_some());
        assert_eq!(id.normalize(&keys(&["a", "c"])), None);
        assert_eq!(id.normalize(&keys(&["a"])), None);
    }

    #[test]
    fn test_positional_follows_key_order() {
        let id = Id::from(vec![Value::from(1i64), Value::from("x")]);
        assert_eq!(
            id.normalize(&keys(&["a", "b"])),
            Some(record([("a", Value::from(1i64)), ("b", Value::from("x"))]))
        );
        assert_eq!(id.normalize(&keys(&["a"])), None);
    }

    #[test]
    fn test_from_fields() {
        let data = record([("a", Value::from(1i64)), ("b", Value::String(None))]);
        assert_eq!(Id::from_fields(&data, &keys(&["a"])), Some(Id::from(1i64)));
        assert_eq!(Id::from_fields(&data, &keys(&["a", "b"])), None);
        assert_eq!(Id::from_fields(&data, &[]), None);
    }

    #[test]
    fn test_is_null() {
        assert!(Id::Single(Value::BigInt(None)).is_null());
        assert!(Id::Composite(Record::new()).is_null());
        assert!(!Id::from("k").is_null());
    }
}
