//! Value helpers shared by the validation engine and the value resolver.
//!
//! Tag values are untyped `serde_json::Value`s. A string of the exact form
//! `${identifier}` is a placeholder: it stands for a variable resolved later
//! and is exempt from direct validation.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FormError, Result};

/// Any `${...}` without nested `$`, `{` or `}`.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{[^${}]+\}$").expect("placeholder pattern is valid"));

/// A tag code already written in placeholder form, e.g. `${host_ip}`.
/// Word characters are ASCII only.
static WRAPPED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{[A-Za-z0-9_]+\}$").expect("wrapped key pattern is valid"));

/// A single entry in a constants table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variable {
    pub value: Value,
    /// Anything else the owning container keeps alongside the value.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Variable {
    /// A variable with no extra fields.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            extra: Map::new(),
        }
    }
}

/// Constants keyed by placeholder (`${name}`).
pub type Constants = IndexMap<String, Variable>;

/// Whether `value` is a variable placeholder.
///
/// Matched against the value's text form, so a single-item array holding a
/// placeholder counts as one.
pub fn is_placeholder(value: &Value) -> bool {
    PLACEHOLDER.is_match(&pattern_subject(value))
}

/// Normalize a tag code into the key used by a constants table.
pub fn placeholder_key(tag_code: &str) -> String {
    if WRAPPED_KEY.is_match(tag_code) {
        tag_code.to_string()
    } else {
        format!("${{{tag_code}}}")
    }
}

/// Loose truthiness: `null`, `false`, `0`, and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Emptiness as seen by the `required` rule.
///
/// Objects need at least one key, arrays at least one truthy element and
/// strings at least one character. Numbers always render to non-empty text
/// and `null`/booleans are never empty.
pub fn is_required_empty(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => !items.iter().any(is_truthy),
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.to_string().is_empty(),
        Value::Null | Value::Bool(_) => false,
    }
}

/// Text a pattern is tested against. Arrays join their items with `,`.
pub fn pattern_subject(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => pattern_subject(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Look up a nested value by key path. Returns a deep copy.
pub fn lookup_path<S: AsRef<str>>(path: &[S], data: &Value) -> Result<Value> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(data.clone());
    };
    let key = head.as_ref();
    let child = data
        .as_object()
        .and_then(|map| map.get(key))
        .ok_or_else(|| FormError::missing_path(key))?;
    if rest.is_empty() {
        Ok(child.clone())
    } else {
        lookup_path(rest, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!("${budget}"), true)]
    #[case(json!("${a.b}"), true)]
    #[case(json!("${}"), false)]
    #[case(json!("${a}${b}"), false)]
    #[case(json!("prefix ${a}"), false)]
    #[case(json!(42), false)]
    #[case(json!(["${x}"]), true)]
    #[case(json!(["${a}", "${b}"]), false)]
    #[case(json!({"k": "${x}"}), false)]
    fn placeholder_detection(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(is_placeholder(&value), expected);
    }

    #[test]
    fn placeholder_key_wraps_bare_codes() {
        assert_eq!(placeholder_key("x"), "${x}");
        assert_eq!(placeholder_key("${x}"), "${x}");
    }

    #[test]
    fn placeholder_key_rewraps_non_ascii_codes() {
        assert_eq!(placeholder_key("${名}"), "${${名}}");
        assert_eq!(placeholder_key("名"), "${名}");
    }

    #[rstest]
    #[case(json!({}), true)]
    #[case(json!({"a": 1}), false)]
    #[case(json!([0, "", null]), true)]
    #[case(json!([0, "x"]), false)]
    #[case(json!([]), true)]
    #[case(json!(""), true)]
    #[case(json!("a"), false)]
    #[case(json!(0), false)]
    #[case(json!(null), false)]
    #[case(json!(false), false)]
    fn required_emptiness(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(is_required_empty(&value), expected);
    }

    #[test]
    fn pattern_subject_renders_scalars() {
        assert_eq!(pattern_subject(&json!("abc")), "abc");
        assert_eq!(pattern_subject(&json!(12)), "12");
        assert_eq!(pattern_subject(&json!(true)), "true");
        assert_eq!(pattern_subject(&json!([1, null, "x"])), "1,,x");
    }

    #[test]
    fn lookup_nested_value() {
        let data = json!({"a": {"b": 7}});
        assert_eq!(lookup_path(&["a", "b"], &data).unwrap(), json!(7));
        assert_eq!(lookup_path(&["a"], &data).unwrap(), json!({"b": 7}));
    }

    #[test]
    fn lookup_missing_segment_errors() {
        let data = json!({"a": 1});
        let err = lookup_path(&["z"], &data).unwrap_err();
        assert!(matches!(err, FormError::MissingPath { ref segment } if segment == "z"));

        let err = lookup_path(&["a", "b"], &data).unwrap_err();
        assert!(matches!(err, FormError::MissingPath { ref segment } if segment == "b"));
    }

    #[test]
    fn variable_keeps_extra_fields() {
        let var: Variable =
            serde_json::from_value(json!({"value": 3, "source_type": "custom"})).unwrap();
        assert_eq!(var.value, json!(3));
        assert_eq!(var.extra["source_type"], json!("custom"));
    }
}
