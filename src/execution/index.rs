//! Hash-based unique indexing for table rows. O(1) row lookup by key.
//!
//! # Architecture
//!
//! ```text
//! TableStore
//!   `-- Vec<UniqueIndex>            (slot k == this.T._indices[k])
//!         `-- UniqueIndex
//!               |-- columns         (key columns, in declared order)
//!               `-- HashMap<IndexKey, Row>
//! ```
//!
//! Generated code probes in two steps, `hash(values..)` then `get(key)`, so
//! the key is a first-class runtime value: a string encoding of the column
//! values in which numbers are normalized (`1` and `1.0` share a key).

use std::collections::HashMap;

use crate::value::{Row, Value};

use super::{ExecutionError, ExecutionResult};

/// Encoded index key
pub type IndexKey = String;

/// Encode `values` as a key
pub fn hash_values(values: &[Value]) -> IndexKey {
    values
        .iter()
        .map(|value| match value {
            Value::Null => "n".to_string(),
            Value::Bool(b) => format!("b{b}"),
            Value::Int(_) | Value::Float(_) => format!("#{:?}", value.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => format!("s{s}"),
            other => format!("o{other}"),
        })
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

/// Unique index over one or more columns of a table
#[derive(Debug, Clone)]
pub struct UniqueIndex {
    table: String,
    columns: Vec<String>,
    rows: HashMap<IndexKey, Row>,
}

impl UniqueIndex {
    pub fn new(table: &str, columns: Vec<String>) -> Self {
        UniqueIndex {
            table: table.to_string(),
            columns,
            rows: HashMap::new(),
        }
    }

    /// Key columns
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Key of a row under this index
    pub fn key_of(&self, row: &Row) -> IndexKey {
        let values: Vec<Value> = self.columns.iter().map(|c| row.get(c)).collect();
        hash_values(&values)
    }

    pub fn insert(&mut self, row: &Row) -> ExecutionResult<()> {
        let key = self.key_of(row);
        if self.rows.contains_key(&key) {
            return Err(ExecutionError::UniqueViolation {
                table: self.table.clone(),
                columns: self.columns.join(","),
            });
        }
        self.rows.insert(key, row.clone());
        Ok(())
    }

    /// Row stored under `key`
    pub fn get(&self, key: &str) -> Option<&Row> {
        self.rows.get(key)
    }

    /// Drop every entry and index `rows` again
    pub fn rebuild<'a>(&mut self, rows: impl IntoIterator<Item = &'a Row>) -> ExecutionResult<()> {
        self.rows.clear();
        for row in rows {
            self.insert(row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, name: &str) -> Row {
        Row::new(
            "Users",
            vec![
                ("id".to_string(), Value::Int(id)),
                ("name".to_string(), Value::string(name)),
            ],
        )
    }

    #[test]
    fn test_probe_by_key() {
        let mut index = UniqueIndex::new("Users", vec!["id".to_string()]);
        let ann = user(1, "ann");
        index.insert(&ann).unwrap();
        index.insert(&user(2, "bob")).unwrap();

        let key = hash_values(&[Value::Float(1.0)]);
        assert!(index.get(&key).unwrap().same_row(&ann));
        assert!(index.get(&hash_values(&[Value::Int(3)])).is_none());
        assert!(index.get(&hash_values(&[Value::string("1")])).is_none());
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let mut index = UniqueIndex::new("Users", vec!["id".to_string()]);
        index.insert(&user(1, "ann")).unwrap();
        let err = index.insert(&user(1, "again")).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate key in Users unique(id)");
    }

    #[test]
    fn test_rebuild_after_change() {
        let mut index = UniqueIndex::new("Users", vec!["id".to_string()]);
        let rows = vec![user(1, "ann"), user(2, "bob")];
        index.rebuild(&rows).unwrap();
        rows[0].set("id", Value::Int(5));
        index.rebuild(&rows).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.get(&hash_values(&[Value::Int(5)])).is_some());
    }
}
