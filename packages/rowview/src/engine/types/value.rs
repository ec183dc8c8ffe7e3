use crate::engine::table::TableData;
use crate::error::{Result, ViewError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Bool,
    DateTime,
    Float,
    Double,
    String,
    Binary,
    Mixed,
    Link,
    LinkList,
    Table,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int => "int",
            DataType::Bool => "bool",
            DataType::DateTime => "datetime",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::String => "string",
            DataType::Binary => "binary",
            DataType::Mixed => "mixed",
            DataType::Link => "link",
            DataType::LinkList => "linklist",
            DataType::Table => "table",
        };
        f.write_str(name)
    }
}

/// A single cell value as held by the in-memory storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Bool(bool),
    /// Seconds since the epoch.
    DateTime(i64),
    Float(f32),
    Double(f64),
    String(SmolStr),
    Binary(Vec<u8>),
    Link(Option<usize>),
    LinkList(Vec<usize>),
    Table(Box<TableData>),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Bool(_) => DataType::Bool,
            Value::DateTime(_) => DataType::DateTime,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::String(_) => DataType::String,
            Value::Binary(_) => DataType::Binary,
            Value::Link(_) => DataType::Link,
            Value::LinkList(_) => DataType::LinkList,
            Value::Table(_) => DataType::Table,
        }
    }

    /// Integer payload. DateTime cells are readable as integers.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) | Value::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Numeric view used by predicates and aggregates.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) | Value::DateTime(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert `self` into something a column of type `ty` can hold.
    pub(crate) fn coerce_for(self, column: usize, ty: DataType) -> Result<Value> {
        let actual = self.data_type();
        match (ty, self) {
            (DataType::DateTime, Value::Int(v)) => Ok(Value::DateTime(v)),
            (DataType::Mixed, Value::Link(_)) | (DataType::Mixed, Value::LinkList(_)) => {
                Err(ViewError::TypeMismatch {
                    column,
                    expected: ty,
                    actual,
                })
            }
            (DataType::Mixed, v) => Ok(v),
            (ty, v) if v.data_type() == ty => Ok(v),
            (ty, _) => Err(ViewError::TypeMismatch {
                column,
                expected: ty,
                actual,
            }),
        }
    }

    /// Total order used by sorting and range predicates.
    ///
    /// Numbers compare across representations; unrelated types fall back to a
    /// fixed type rank so the order stays deterministic.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (
                Value::Int(a) | Value::DateTime(a),
                Value::Int(b) | Value::DateTime(b),
            ) => a.cmp(b),
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                // NaN ranks after every number and equal to itself
                x.partial_cmp(&y).unwrap_or_else(|| x.is_nan().cmp(&y.is_nan()))
            }
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::Link(a), Value::Link(b)) => a.cmp(b),
            (Value::LinkList(a), Value::LinkList(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Value::Table(a), Value::Table(b)) => a.size().cmp(&b.size()),
            (a, b) => type_rank(a).cmp(&type_rank(b)),
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Float(v) if v.is_nan()) || matches!(self, Value::Double(v) if v.is_nan())
    }

    pub(crate) fn distinct_key(&self) -> DistinctKey {
        match self {
            Value::Int(v) | Value::DateTime(v) => DistinctKey::Int(*v),
            Value::Bool(b) => DistinctKey::Bool(*b),
            Value::Float(v) => DistinctKey::Float(canonical_bits(*v as f64)),
            Value::Double(v) => DistinctKey::Float(canonical_bits(*v)),
            Value::String(s) => DistinctKey::Str(s.clone()),
            Value::Binary(b) => DistinctKey::Bytes(b.clone()),
            Value::Link(l) => DistinctKey::Link(*l),
            Value::LinkList(l) => DistinctKey::Links(l.clone()),
            Value::Table(t) => DistinctKey::Opaque(format!("{:?}", t)),
        }
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 0,
        Value::Int(_) | Value::DateTime(_) | Value::Float(_) | Value::Double(_) => 1,
        Value::String(_) => 2,
        Value::Binary(_) => 3,
        Value::Link(_) => 4,
        Value::LinkList(_) => 5,
        Value::Table(_) => 6,
    }
}

fn canonical_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

/// Hashable identity of a value, used to pick one representative row per
/// distinct value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DistinctKey {
    Int(i64),
    Bool(bool),
    Float(u64),
    Str(SmolStr),
    Bytes(Vec<u8>),
    Link(Option<usize>),
    Links(Vec<usize>),
    Opaque(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(SmolStr::new(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(SmolStr::from(v))
    }
}

impl From<SmolStr> for Value {
    fn from(v: SmolStr) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(val: &Value) -> Self {
        match val {
            Value::Int(v) | Value::DateTime(v) => json!(v),
            Value::Bool(b) => json!(b),
            Value::Float(v) => json!(v),
            Value::Double(v) => json!(v),
            Value::String(s) => json!(s.as_str()),
            Value::Binary(b) => json!(b),
            Value::Link(l) => json!(l),
            Value::LinkList(l) => json!(l),
            Value::Table(t) => json!({ "size": t.size() }),
        }
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn test_numeric_compare_across_types() {
        assert_eq!(Value::Int(3).compare(&Value::Double(3.5)), Ordering::Less);
        assert_eq!(Value::Float(2.0).compare(&Value::Int(2)), Ordering::Equal);
        assert_eq!(Value::DateTime(10).compare(&Value::Int(9)), Ordering::Greater);
    }

    #[test]
    fn test_nan_sorts_after_numbers() {
        let nan = Value::Double(f64::NAN);
        assert_eq!(nan.compare(&Value::Double(1e300)), Ordering::Greater);
        assert_eq!(Value::Int(i64::MAX).compare(&nan), Ordering::Less);
        assert_eq!(nan.compare(&Value::Float(f32::NAN)), Ordering::Equal);
        assert_eq!(Value::Double(-0.0).compare(&Value::Double(0.0)), Ordering::Equal);
        assert!(nan.is_nan());
        assert!(!Value::Int(0).is_nan());
    }

    #[test]
    fn test_unrelated_types_use_rank() {
        assert_eq!(Value::Bool(true).compare(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::from("a").compare(&Value::Int(99)), Ordering::Greater);
    }

    #[test]
    fn test_coerce_int_into_datetime() {
        let v = Value::Int(1_700_000_000).coerce_for(0, DataType::DateTime).unwrap();
        assert_eq!(v, Value::DateTime(1_700_000_000));
        assert_eq!(v.as_int(), Some(1_700_000_000));
    }

    #[test]
    fn test_coerce_rejects_wrong_type() {
        let err = Value::from("x").coerce_for(2, DataType::Int).unwrap_err();
        assert_eq!(
            err,
            ViewError::TypeMismatch {
                column: 2,
                expected: DataType::Int,
                actual: DataType::String
            }
        );
    }

    #[test]
    fn test_distinct_key_folds_zero_and_nan() {
        assert_eq!(Value::Double(0.0).distinct_key(), Value::Double(-0.0).distinct_key());
        assert_eq!(
            Value::Double(f64::NAN).distinct_key(),
            Value::Float(f32::NAN).distinct_key()
        );
    }
}
