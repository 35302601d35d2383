//! # Value Type System
//!
//! Runtime values manipulated by generated procedures: the data held in table
//! rows and scalars, plus the reference types procedures pass around (rows,
//! fixed-length vectors and small records).
//!
//! Numbers follow the generated code's single numeric domain: `Int` and
//! `Float` compare equal when they denote the same number.
//!
//! ```rust
//! use bucket::value::{Row, Value};
//!
//! let row = Row::new("Users", vec![
//!     ("id".to_string(), Value::Int(1)),
//!     ("name".to_string(), Value::string("a")),
//! ]);
//! assert_eq!(row.get("name"), Value::string("a"));
//! assert!(Value::Int(1).strict_eq(&Value::Float(1.0)));
//! ```

use parking_lot::Mutex;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;
use std::sync::Arc;

/// A runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// Null/missing value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integral number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string (reference counted for cheap cloning)
    String(Arc<str>),
    /// Fixed-length numeric vector, shared so element writes are visible to
    /// every holder
    Vector(Arc<Mutex<Vec<f64>>>),
    /// A table row, compared by identity
    Row(Row),
    /// Small immutable record, e.g. a queued delete `{t, r}`
    Record(Arc<Vec<(String, Value)>>),
}

impl Value {
    /// Create a string value from a &str
    pub fn string(s: &str) -> Self {
        Value::String(Arc::from(s))
    }

    /// Create a vector value
    pub fn vector(data: Vec<f64>) -> Self {
        Value::Vector(Arc::new(Mutex::new(data)))
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Try to get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as row handle
    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Value::Row(row) => Some(row),
            _ => None,
        }
    }

    /// Truthiness as the generated code sees it
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0 && !v.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Vector(_) | Value::Row(_) | Value::Record(_) => true,
        }
    }

    /// `===`: same kind and same value; reference types by identity
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Row(a), Value::Row(b)) => a.same_row(b),
            (Value::Vector(a), Value::Vector(b)) => Arc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// `==`: strict equality plus numeric coercion of numeric strings
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self.strict_eq(other) {
            return true;
        }
        match (self, other) {
            (Value::String(s), n) | (n, Value::String(s)) => match (s.trim().parse::<f64>(), n.as_f64()) {
                (Ok(x), Some(y)) => x == y,
                _ => false,
            },
            (Value::Bool(b), n) | (n, Value::Bool(b)) => {
                n.as_f64() == Some(if *b { 1.0 } else { 0.0 })
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::String(s) => write!(f, "{}", serde_json::Value::String(s.to_string())),
            Value::Vector(v) => {
                let items: Vec<String> = v.lock().iter().map(|x| format!("{x}")).collect();
                write!(f, "[{}]", items.join(","))
            }
            Value::Row(row) => write!(f, "<row {}>", row.table()),
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Vector(a), Value::Vector(b)) => Arc::ptr_eq(a, b) || *a.lock() == *b.lock(),
            _ => self.strict_eq(other),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::String(s) => serializer.serialize_str(s),
            Value::Vector(v) => {
                let data = v.lock();
                let mut seq = serializer.serialize_seq(Some(data.len()))?;
                for x in data.iter() {
                    seq.serialize_element(x)?;
                }
                seq.end()
            }
            Value::Row(_) | Value::Record(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

#[derive(Debug)]
struct RowData {
    table: String,
    fields: Vec<(String, Value)>,
}

/// A mutable table row shared between the table storage and any procedure
/// currently holding it
#[derive(Debug, Clone)]
pub struct Row(Arc<Mutex<RowData>>);

impl Row {
    pub fn new(table: &str, fields: Vec<(String, Value)>) -> Self {
        Row(Arc::new(Mutex::new(RowData {
            table: table.to_string(),
            fields,
        })))
    }

    /// Name of the table the row was created in
    pub fn table(&self) -> String {
        self.0.lock().table.clone()
    }

    /// Field value, or null when the row has no such field
    pub fn get(&self, column: &str) -> Value {
        self.0
            .lock()
            .fields
            .iter()
            .find(|(name, _)| name == column)
            .map_or(Value::Null, |(_, v)| v.clone())
    }

    pub fn set(&self, column: &str, value: Value) {
        let mut data = self.0.lock();
        match data.fields.iter_mut().find(|(name, _)| name == column) {
            Some((_, slot)) => *slot = value,
            None => data.fields.push((column.to_string(), value)),
        }
    }

    /// Snapshot of all fields in column order
    pub fn fields(&self) -> Vec<(String, Value)> {
        self.0.lock().fields.clone()
    }

    pub fn same_row(&self, other: &Row) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_domain_is_shared() {
        assert!(Value::Int(2).strict_eq(&Value::Float(2.0)));
        assert!(!Value::Int(2).strict_eq(&Value::string("2")));
        assert!(Value::Int(2).loose_eq(&Value::string("2")));
    }

    #[test]
    fn test_rows_compare_by_identity() {
        let a = Row::new("T", vec![("x".to_string(), Value::Int(1))]);
        let b = Row::new("T", vec![("x".to_string(), Value::Int(1))]);
        assert!(Value::Row(a.clone()).strict_eq(&Value::Row(a.clone())));
        assert!(!Value::Row(a).strict_eq(&Value::Row(b)));
    }

    #[test]
    fn test_row_writes_are_shared() {
        let row = Row::new("T", vec![("x".to_string(), Value::Int(1))]);
        let alias = row.clone();
        alias.set("x", Value::Int(5));
        assert_eq!(row.get("x"), Value::Int(5));
        assert!(row.get("missing").is_null());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::string("").truthy());
        assert!(Value::Row(Row::new("T", vec![])).truthy());
    }

    #[test]
    fn test_display_round_trips_literals() {
        assert_eq!(Value::string("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::vector(vec![1.0, 2.5]).to_string(), "[1,2.5]");
    }
}
