//! In-memory tabular data: typed values, columns and the data frame that
//! queries run against.

pub mod dataframe;

pub use dataframe::DataFrame;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Column types inferred from CSV input or from query results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Integer => "INTEGER",
            DataType::Float => "REAL",
            DataType::Boolean => "BOOLEAN",
            DataType::Text => "TEXT",
        };
        f.write_str(name)
    }
}

/// A single cell value
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

/// A number extracted from a value for arithmetic
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Real(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Real(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::Integer(i),
            Number::Real(f) => Value::Float(f),
        }
    }
}

/// Hashable projection of a value, used for GROUP BY and DISTINCT
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Null,
    Int(i64),
    Real(u64),
    Bool(bool),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Text(_) => Some(DataType::Text),
        }
    }

    /// Strict numeric view: text only counts when it parses as a number.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Real(*f)),
            Value::Boolean(b) => Some(Number::Int(i64::from(*b))),
            Value::Text(s) => parse_number(s),
        }
    }

    /// Numeric view for arithmetic. Non-numeric text counts as zero, as in SQLite.
    pub fn to_number(&self) -> Option<Number> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(parse_number(s).unwrap_or(Number::Int(0))),
            other => other.as_number(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(Number::as_f64)
    }

    /// SQL truthiness; `None` for NULL.
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Text(s) => Some(parse_number(s).map(|n| n.as_f64() != 0.0).unwrap_or(false)),
        }
    }

    /// SQL comparison. NULL compares as unknown.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        Some(self.sort_cmp(other))
    }

    /// Total order used for sorting: NULL < numbers < text.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Text(a), b) => match parse_number(a) {
                Some(n) => cmp_numbers(n, b.as_number().unwrap_or(Number::Int(0))),
                None => Ordering::Greater,
            },
            (a, Value::Text(b)) => match parse_number(b) {
                Some(n) => cmp_numbers(a.as_number().unwrap_or(Number::Int(0)), n),
                None => Ordering::Less,
            },
            (a, b) => cmp_numbers(
                a.as_number().unwrap_or(Number::Int(0)),
                b.as_number().unwrap_or(Number::Int(0)),
            ),
        }
    }

    pub fn key(&self) -> ValueKey {
        match self {
            Value::Null => ValueKey::Null,
            Value::Integer(i) => ValueKey::Int(*i),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                ValueKey::Int(*f as i64)
            }
            Value::Float(f) => ValueKey::Real(f.to_bits()),
            Value::Boolean(b) => ValueKey::Bool(*b),
            Value::Text(s) => ValueKey::Text(s.clone()),
        }
    }

    /// Text rendering without the NULL marker, used by string functions.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                write!(f, "{:.1}", v)
            }
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

pub fn parse_number(s: &str) -> Option<Number> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Number::Int(i));
    }
    match trimmed.parse::<f64>() {
        // "inf" and "NaN" parse as floats but are not numbers in CSV data
        Ok(f) if f.is_finite() => Some(Number::Real(f)),
        _ => None,
    }
}

fn cmp_numbers(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.cmp(&y),
        (x, y) => x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal),
    }
}

/// A named, typed column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Integer(-4).to_string(), "-4");
        assert_eq!(Value::Text("abc".into()).to_string(), "abc");
    }

    #[test]
    fn test_mixed_numeric_comparison() {
        assert_eq!(Value::Integer(2).compare(&Value::Float(2.0)), Some(Ordering::Equal));
        assert_eq!(Value::Integer(3).compare(&Value::Float(2.5)), Some(Ordering::Greater));
        assert_eq!(Value::Text("10".into()).compare(&Value::Integer(9)), Some(Ordering::Greater));
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
    }

    #[test]
    fn test_sort_order_puts_text_after_numbers() {
        let mut values = vec![
            Value::Text("b".into()),
            Value::Integer(5),
            Value::Null,
            Value::Float(1.5),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            values,
            vec![Value::Null, Value::Float(1.5), Value::Integer(5), Value::Text("b".into())]
        );
    }

    #[test]
    fn test_whole_floats_share_group_key_with_integers() {
        assert_eq!(Value::Float(4.0).key(), Value::Integer(4).key());
        assert_ne!(Value::Float(4.5).key(), Value::Integer(4).key());
    }

    #[test]
    fn test_json_serialization_is_untagged() {
        let row = vec![Value::Integer(1), Value::Null, Value::Text("x".into()), Value::Boolean(true)];
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"[1,null,"x",true]"#);
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(Value::Integer(0).truthy(), Some(false));
        assert_eq!(Value::Text("abc".into()).truthy(), Some(false));
        assert_eq!(Value::Text("2".into()).truthy(), Some(true));
        assert_eq!(Value::Null.truthy(), None);
    }
}
