//! Field validation for model operations.
//!
//! A [`Validator`] checks the arguments of a create or update before the
//! model touches storage. Failures are collected into [`ValidationErrors`]
//! on the model rather than raised.

use crate::value::{self, Record};
use regex::Regex;
use sea_query::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Errors collected from failed validation
///
/// `global` holds messages not tied to one field; `form` maps a field to
/// its first failing message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationErrors {
    pub global: Vec<String>,
    pub form: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.form.is_empty()
    }

    pub fn add_global(&mut self, message: impl Into<String>) {
        self.global.push(message.into());
    }

    /// Record a field error; the first message per field is kept
    pub fn add_field(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.form.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        self.global.extend(other.global);
        for (field, message) in other.form {
            self.add_field(field, message);
        }
    }

    pub fn clear(&mut self) {
        self.global.clear();
        self.form.clear();
    }

    /// `{"success": false, "error": {"global": [...], "form": {...}}}`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self,
        })
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut messages: Vec<String> = self.global.clone();
        messages.extend(self.form.iter().map(|(k, v)| format!("{}: {}", k, v)));
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

pub trait Validator {
    /// # Errors
    ///
    /// The collected errors when any rule fails.
    fn validate(&self, data: &Record) -> Result<(), ValidationErrors>;
}

/// Single-field rule
#[derive(Debug, Clone)]
pub enum Rule {
    /// Present, not null, not blank
    Required,
    /// Character count bounds
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    Pattern(Regex),
    Numeric,
}

impl Rule {
    /// Failure message, if the value breaks the rule
    ///
    /// Only `Required` fails on an absent or null value.
    fn check(&self, field: &str, value: Option<&Value>) -> Option<String> {
        let present = value.filter(|v| !value::is_null_like(v));
        match self {
            Rule::Required => match present {
                Some(v) if !value::as_string(v).trim().is_empty() => None,
                _ => Some(format!("{} is required", field)),
            },
            Rule::Length { min, max } => {
                let len = value::as_string(present?).chars().count();
                if min.is_some_and(|m| len < m) || max.is_some_and(|m| len > m) {
                    Some(match (min, max) {
                        (Some(lo), Some(hi)) => {
                            format!("{} must be between {} and {} characters", field, lo, hi)
                        }
                        (Some(lo), None) => format!("{} must be at least {} characters", field, lo),
                        (None, Some(hi)) => format!("{} must be at most {} characters", field, hi),
                        (None, None) => format!("{} has an invalid length", field),
                    })
                } else {
                    None
                }
            }
            Rule::Pattern(regex) => {
                let text = value::as_string(present?);
                (!regex.is_match(&text)).then(|| format!("{} has an invalid format", field))
            }
            Rule::Numeric => {
                let v = present?;
                let numeric = match v {
                    Value::String(Some(s)) => s.trim().parse::<f64>().is_ok(),
                    Value::Bool(_) | Value::Json(_) | Value::Bytes(_) | Value::Char(_) => false,
                    _ => true,
                };
                (!numeric).then(|| format!("{} must be numeric", field))
            }
        }
    }
}

type GlobalRule = Box<dyn Fn(&Record) -> Option<String>>;

/// Validator built from per-field rules and whole-record checks
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<(String, Rule)>,
    global: Vec<GlobalRule>,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.rules)
            .field("global", &self.global.len())
            .finish()
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, field: impl Into<String>, rule: Rule) -> Self {
        self.rules.push((field.into(), rule));
        self
    }

    /// Whole-record check returning a global message on failure
    pub fn global_rule<F>(mut self, check: F) -> Self
    where
        F: Fn(&Record) -> Option<String> + 'static,
    {
        self.global.push(Box::new(check));
        self
    }
}

impl Validator for RuleSet {
    fn validate(&self, data: &Record) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for (field, rule) in &self.rules {
            if let Some(message) = rule.check(field, data.get(field)) {
                errors.add_field(field.clone(), message);
            }
        }
        for check in &self.global {
            if let Some(message) = check(data) {
                errors.add_global(message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::record;

    fn rules() -> RuleSet {
        RuleSet::new()
            .rule("name", Rule::Required)
            .rule("name", Rule::Length { min: Some(2), max: Some(5) })
            .rule("email", Rule::Pattern(Regex::new(r"^[^@\s]+@[^@\s]+$").expect("regex")))
            .rule("age", Rule::Numeric)
    }

    #[test]
    fn test_valid_record() {
        let data = record([
            ("name", Value::from("Ann")),
            ("email", Value::from("ann@example.com")),
            ("age", Value::from("42")),
        ]);
        assert!(rules().validate(&data).is_ok());
    }

    #[test]
    fn test_optional_rules_skip_missing_fields() {
        let data = record([("name", Value::from("Ann"))]);
        assert!(rules().validate(&data).is_ok());
    }

    #[test]
    fn test_first_message_per_field_wins() {
        let errors = rules()
            .validate(&record([("name", Value::from("  ")), ("age", Value::from("x"))]))
            .expect_err("invalid");
        assert_eq!(errors.form.get("name").map(String::as_str), Some("name is required"));
        assert_eq!(errors.form.get("age").map(String::as_str), Some("age must be numeric"));
    }

    #[test]
    fn test_length_and_pattern_messages() {
        let errors = rules()
            .validate(&record([
                ("name", Value::from("Annabelle")),
                ("email", Value::from("nope")),
            ]))
            .expect_err("invalid");
        assert_eq!(
            errors.form.get("name").map(String::as_str),
            Some("name must be between 2 and 5 characters")
        );
        assert_eq!(
            errors.form.get("email").map(String::as_str),
            Some("email has an invalid format")
        );
    }

    #[test]
    fn test_global_rule_and_json_shape() {
        let set = RuleSet::new().global_rule(|data| {
            (!data.contains_key("token")).then(|| "token missing".to_string())
        });
        let errors = set.validate(&Record::new()).expect_err("invalid");
        assert_eq!(
            errors.to_json(),
            serde_json::json!({
                "success": false,
                "error": { "global": ["token missing"], "form": {} }
            })
        );
    }

    #[test]
    fn test_merge_keeps_existing_field_messages() {
        let mut a = ValidationErrors::new();
        a.add_field("x", "first");
        let mut b = ValidationErrors::new();
        b.add_field("x", "second");
        b.add_global("g");
        a.merge(b);
        assert_eq!(a.form.get("x").map(String::as_str), Some("first"));
        assert_eq!(a.global, vec!["g".to_string()]);
    }
}
