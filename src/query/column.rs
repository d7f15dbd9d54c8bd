//! Column definitions.
//!
//! A [`Column`] describes one field of a table: its semantic [`ColumnType`],
//! nullability, default, key flags and optional driver-specific properties.
//! [`Column::format`] coerces raw values into the column's type; the table
//! modules turn columns into `sea_query::ColumnDef`s for DDL.

use crate::error::{OrmError, Result};
use crate::executor::Dialect;
use crate::value;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use sea_query::{ColumnDef, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Layout used for normalised datetime values
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    String,
    Text,
    DateTime,
    Null,
}

impl FromStr for ColumnType {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(ColumnType::Integer),
            "float" | "double" => Ok(ColumnType::Float),
            "bool" | "boolean" => Ok(ColumnType::Boolean),
            "string" | "varchar" => Ok(ColumnType::String),
            "text" => Ok(ColumnType::Text),
            "datetime" => Ok(ColumnType::DateTime),
            "null" => Ok(ColumnType::Null),
            _ => Err(OrmError::InvalidColumnType(s.to_string())),
        }
    }
}

impl ColumnType {
    /// Typed null for this column type
    pub fn null_value(&self) -> Value {
        match self {
            ColumnType::Integer => Value::BigInt(None),
            ColumnType::Float => Value::Double(None),
            ColumnType::Boolean => Value::Bool(None),
            ColumnType::String | ColumnType::Text | ColumnType::DateTime | ColumnType::Null => {
                Value::String(None)
            }
        }
    }

    /// Coarse type family of a declared SQL type, as reported by a live schema
    pub(crate) fn family_of_declared(declared: &str) -> ColumnType {
        let t = declared.trim().to_ascii_lowercase();
        if t.starts_with("tinyint(1)") || t.contains("bool") {
            ColumnType::Boolean
        } else if t.contains("date") || t.contains("time") {
            ColumnType::DateTime
        } else if t.contains("int") {
            ColumnType::Integer
        } else if t.contains("real") || t.contains("floa") || t.contains("doub") {
            ColumnType::Float
        } else {
            ColumnType::Text
        }
    }

    /// Family this type is stored as, for schema comparison
    pub(crate) fn family(&self) -> ColumnType {
        match self {
            ColumnType::String | ColumnType::Text | ColumnType::Null => ColumnType::Text,
            other => *other,
        }
    }
}

/// A table column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    default: Option<Value>,
    nullable: bool,
    primary_key: bool,
    auto_increment: bool,
    length: Option<u32>,
    properties: BTreeMap<String, String>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            default: None,
            nullable: column_type == ColumnType::Null,
            primary_key: false,
            auto_increment: false,
            length: None,
            properties: BTreeMap::new(),
        }
    }

    /// Build a column from a type name such as `"int"` or `"string"`
    ///
    /// # Errors
    ///
    /// `InvalidColumnType` if the name is not a known type.
    pub fn parse(name: impl Into<String>, column_type: &str) -> Result<Self> {
        Ok(Self::new(name, column_type.parse()?))
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default = Some(self.format(&value));
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Attach a driver-specific property (`unsigned`, `comment`, `collate`)
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn get_default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    pub fn get_length(&self) -> Option<u32> {
        self.length
    }

    pub fn get_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Coerce a raw value into this column's type
    ///
    /// Null (or the string `"null"`) stays null on nullable columns; anything
    /// else goes through loose conversion, so `"00"` formats to `0` on an
    /// integer column and a non-nullable null becomes the type's zero value.
    pub fn format(&self, raw: &Value) -> Value {
        if self.column_type == ColumnType::Null
            || (self.nullable && value::is_null_like(raw))
        {
            return self.column_type.null_value();
        }
        match self.column_type {
            ColumnType::Integer => Value::BigInt(Some(value::as_i64(raw))),
            ColumnType::Float => Value::Double(Some(value::as_f64(raw))),
            ColumnType::Boolean => Value::Bool(Some(value::as_bool(raw))),
            ColumnType::String | ColumnType::Text => Value::from(value::as_string(raw)),
            ColumnType::DateTime => Value::from(format_datetime(raw)),
            ColumnType::Null => Value::String(None),
        }
    }

    /// SeaQuery definition of this column for the given dialect
    ///
    /// `inline_primary_key` puts `PRIMARY KEY` on the column itself; tables
    /// with a composite key declare it at table level instead.
    pub fn to_column_def(&self, dialect: Dialect, inline_primary_key: bool) -> ColumnDef {
        let mut def = ColumnDef::new(self.name.clone());

        match self.column_type {
            ColumnType::Integer => {
                if dialect == Dialect::Sqlite && self.auto_increment {
                    // SQLite only auto-increments a column declared exactly INTEGER
                    def.integer();
                } else if dialect == Dialect::MySql && self.get_property("unsigned").is_some() {
                    def.big_unsigned();
                } else {
                    def.big_integer();
                }
            }
            ColumnType::Float => {
                def.double();
            }
            ColumnType::Boolean => {
                def.boolean();
            }
            ColumnType::String => match self.length {
                Some(len) => {
                    def.string_len(len);
                }
                None => {
                    def.string_len(255);
                }
            },
            ColumnType::Text | ColumnType::Null => {
                def.text();
            }
            ColumnType::DateTime => {
                def.date_time();
            }
        }

        if self.nullable {
            def.null();
        } else {
            def.not_null();
        }
        if inline_primary_key && self.primary_key {
            def.primary_key();
        }
        if self.auto_increment {
            def.auto_increment();
        }
        if let Some(default) = &self.default {
            if !value::is_null(default) {
                def.default(default.clone());
            }
        }

        if dialect == Dialect::MySql {
            if let Some(collation) = self.get_property("collate") {
                def.extra(format!("COLLATE {}", collation));
            }
            if let Some(comment) = self.get_property("comment") {
                def.comment(comment.to_string());
            }
        }
        def
    }
}

fn format_datetime(raw: &Value) -> String {
    match raw {
        Value::String(Some(s)) => parse_datetime(s)
            .map(|dt| dt.format(DATETIME_FORMAT).to_string())
            .unwrap_or_else(|| s.to_string()),
        other if value::is_null(other) => String::new(),
        other => DateTime::from_timestamp(value::as_i64(other), 0)
            .map(|dt| dt.naive_utc().format(DATETIME_FORMAT).to_string())
            .unwrap_or_default(),
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    const LAYOUTS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
