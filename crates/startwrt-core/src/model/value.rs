// ── Option values ──
//
// UCI options are either a single string (`option`) or an ordered list of
// strings (`list`). rpcd hands them over as JSON strings and arrays.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Scalar(String),
    List(Vec<String>),
}

impl OptionValue {
    /// An empty list carries no information and is treated as unset.
    pub fn is_empty_list(&self) -> bool {
        matches!(self, Self::List(items) if items.is_empty())
    }

    /// Decode a value as rpcd returns it. Numbers and booleans are
    /// stringified, anything else (objects, nested arrays, null) is rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(scalar_from_json)
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            other => scalar_from_json(other).map(Self::Scalar),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Scalar(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }
}

fn scalar_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_owned()),
        _ => None,
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => f.write_str(s),
            Self::List(items) => f.write_str(&items.join(" ")),
        }
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_owned())
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<&str>> for OptionValue {
    fn from(items: Vec<&str>) -> Self {
        Self::List(items.into_iter().map(str::to_owned).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_strings_and_lists() {
        assert_eq!(OptionValue::from_json(&json!("1")), Some("1".into()));
        assert_eq!(
            OptionValue::from_json(&json!(["lan", "guest"])),
            Some(vec!["lan", "guest"].into())
        );
    }

    #[test]
    fn stringifies_numbers_and_booleans() {
        assert_eq!(OptionValue::from_json(&json!(1500)), Some("1500".into()));
        assert_eq!(OptionValue::from_json(&json!(true)), Some("1".into()));
    }

    #[test]
    fn rejects_nested_structures() {
        assert_eq!(OptionValue::from_json(&json!({ "a": 1 })), None);
        assert_eq!(OptionValue::from_json(&json!(["a", ["b"]])), None);
        assert_eq!(OptionValue::from_json(&Value::Null), None);
    }

    #[test]
    fn display_joins_list_items() {
        let value = OptionValue::from(vec!["wan", "wan6"]);
        assert_eq!(value.to_string(), "wan wan6");
    }
}
