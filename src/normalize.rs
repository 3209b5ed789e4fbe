// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use serde::{Deserialize, Serialize};

/// A raw sensor value as delivered by the external value source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Convert a JSON payload; arrays and objects have no boolean meaning.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Result of normalizing a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Readable(bool),
    Unreadable,
}

impl Reading {
    pub fn value(&self) -> Option<bool> {
        match self {
            Self::Readable(v) => Some(*v),
            Self::Unreadable => None,
        }
    }
}

/// Normalize a raw value to a canonical boolean.
///
/// Accepts booleans, the numbers 0 and 1, and the strings "true"/"false"
/// (trimmed, any case). Everything else, including null, is unreadable.
/// `invert` flips an accepted value and never turns garbage into a reading.
pub fn normalize(raw: &RawValue, invert: bool) -> Reading {
    let accepted = match raw {
        RawValue::Bool(b) => Some(*b),
        RawValue::Number(n) if *n == 0.0 => Some(false),
        RawValue::Number(n) if *n == 1.0 => Some(true),
        RawValue::Number(_) => None,
        RawValue::Text(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Some(true)
            } else if s.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        }
        RawValue::Null => None,
    };
    match accepted {
        Some(v) => Reading::Readable(v != invert),
        None => Reading::Unreadable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_forms() {
        assert_eq!(normalize(&true.into(), false), Reading::Readable(true));
        assert_eq!(normalize(&1i64.into(), false), Reading::Readable(true));
        assert_eq!(normalize(&"true".into(), false), Reading::Readable(true));
        assert_eq!(normalize(&"  FaLsE \n".into(), false), Reading::Readable(false));
        assert_eq!(normalize(&0i64.into(), false), Reading::Readable(false));
    }

    #[test]
    fn test_invert_applies_after_acceptance() {
        assert_eq!(normalize(&true.into(), true), Reading::Readable(false));
        assert_eq!(normalize(&1i64.into(), true), Reading::Readable(false));
        assert_eq!(normalize(&"false".into(), true), Reading::Readable(true));
        assert_eq!(normalize(&RawValue::Null, true), Reading::Unreadable);
    }

    #[test]
    fn test_unreadable_forms() {
        assert_eq!(normalize(&2i64.into(), false), Reading::Unreadable);
        assert_eq!(normalize(&0.5f64.into(), false), Reading::Unreadable);
        assert_eq!(normalize(&f64::NAN.into(), false), Reading::Unreadable);
        assert_eq!(normalize(&"yes".into(), false), Reading::Unreadable);
        assert_eq!(normalize(&"1".into(), false), Reading::Unreadable);
        assert_eq!(normalize(&RawValue::Null, false), Reading::Unreadable);
        assert_eq!(normalize(&RawValue::from(None::<bool>), false), Reading::Unreadable);
    }

    #[test]
    fn test_from_json() {
        assert_eq!(RawValue::from_json(&serde_json::json!(true)), RawValue::Bool(true));
        assert_eq!(RawValue::from_json(&serde_json::json!(1)), RawValue::Number(1.0));
        assert_eq!(RawValue::from_json(&serde_json::json!(null)), RawValue::Null);
        assert_eq!(
            normalize(&RawValue::from_json(&serde_json::json!([1])), false),
            Reading::Unreadable
        );
    }
}
