//! CSV Seed Data
//!
//! Turns the bytes of a table's `source` file into seed rows.
//!
//! ## Format
//!
//! - First record is a header and is discarded
//! - Fields are trimmed; unquoted numeric fields become numbers:
//!   - Integers: parsed as i64
//!   - Floats: parsed as f64
//!   - Anything else, and every quoted field, stays a string
//! - Records may have more or fewer fields than the header
//! - A vector column of length N consumes N consecutive fields
//!
//! ## Example
//!
//! ```csv
//! id,name,pos0,pos1
//! 1,"ann",0.5,1.5
//! 2,bob,2,3
//! ```

use serde::Serialize;

use crate::ast::ColumnDecl;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::DataProvider;
use crate::value::Value;

/// Options for CSV parsing
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter (default: ',')
    pub delimiter: char,
    /// Whether the first record is a header (default: true)
    pub has_header: bool,
    /// Quote character for strings (default: '"')
    pub quote_char: char,
    /// Whether to trim whitespace from fields (default: true)
    pub trim_whitespace: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: ',',
            has_header: true,
            quote_char: '"',
            trim_whitespace: true,
        }
    }
}

/// One column value of a seed row
#[derive(Debug, Clone, Serialize)]
pub struct SeedField {
    pub name: String,
    pub value: Value,
    /// Typed-array constructor for vector columns
    #[serde(skip)]
    pub native: Option<&'static str>,
}

/// One row of initial table data, in declared column order
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct SeedRow {
    pub fields: Vec<SeedField>,
}

impl SeedRow {
    /// Field value by column name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    /// Object-literal body, e.g. `id: 1, name: "a", pos: Float64Array.from([1,2])`
    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|field| match (field.native, &field.value) {
                (Some(native), Value::Vector(_)) => {
                    format!("{}: {native}.from({})", field.name, field.value)
                }
                _ => format!("{}: {}", field.name, field.value),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Fetch `file` from `provider` and build seed rows for `columns`
pub fn load_seed(
    provider: &dyn DataProvider,
    file: &str,
    columns: &[ColumnDecl],
) -> StorageResult<Vec<SeedRow>> {
    let bytes = provider.contents(file)?;
    let records = parse_records(&bytes, &CsvOptions::default())?;
    let rows = seed_rows(records, columns)?;
    tracing::debug!(file, rows = rows.len(), "seed_loaded");
    Ok(rows)
}

/// Parse delimited records, dropping the header when present
pub fn parse_records(bytes: &[u8], options: &CsvOptions) -> StorageResult<Vec<Vec<Value>>> {
    let text = String::from_utf8(bytes.to_vec())?;

    let mut records: Vec<Vec<Value>> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            parse_csv_line(line, options)
                .into_iter()
                .map(RawField::into_value)
                .collect()
        })
        .collect();

    if options.has_header && !records.is_empty() {
        records.remove(0);
    }
    Ok(records)
}

/// Assign record fields to columns in declaration order
pub fn seed_rows(records: Vec<Vec<Value>>, columns: &[ColumnDecl]) -> StorageResult<Vec<SeedRow>> {
    records
        .into_iter()
        .enumerate()
        .map(|(line, record)| {
            let mut values = record.into_iter();
            let mut fields = Vec::with_capacity(columns.len());

            for column in columns {
                match column.ty.length {
                    Some(length) => {
                        let native = column.ty.native_array().ok_or_else(|| {
                            StorageError::Other(format!("Invalid type: {}", column.ty.base))
                        })?;
                        let mut data = Vec::with_capacity(length);
                        for _ in 0..length {
                            let value = values.next().ok_or_else(|| {
                                StorageError::ParseError(format!(
                                    "row {}: column {} expects {length} values",
                                    line + 1,
                                    column.name
                                ))
                            })?;
                            data.push(value.as_f64().ok_or_else(|| {
                                StorageError::ParseError(format!(
                                    "row {}: column {} expects numbers, got {value}",
                                    line + 1,
                                    column.name
                                ))
                            })?);
                        }
                        fields.push(SeedField {
                            name: column.name.clone(),
                            value: Value::vector(data),
                            native: Some(native),
                        });
                    }
                    None => fields.push(SeedField {
                        name: column.name.clone(),
                        value: values.next().unwrap_or(Value::Null),
                        native: None,
                    }),
                }
            }
            Ok(SeedRow { fields })
        })
        .collect()
}

struct RawField {
    text: String,
    quoted: bool,
}

impl RawField {
    fn into_value(self) -> Value {
        if self.quoted {
            return Value::string(&self.text);
        }
        if let Ok(v) = self.text.parse::<i64>() {
            return Value::Int(v);
        }
        match self.text.parse::<f64>() {
            Ok(v) if !self.text.is_empty() => Value::Float(v),
            _ => Value::string(&self.text),
        }
    }
}

/// Split one line into fields, honoring quotes and doubled-quote escapes
fn parse_csv_line(line: &str, options: &CsvOptions) -> Vec<RawField> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    let finish = |current: &mut String, quoted: bool| {
        let text = std::mem::take(current);
        let text = if options.trim_whitespace && !quoted {
            text.trim().to_string()
        } else {
            text
        };
        RawField { text, quoted }
    };

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == options.quote_char {
                if chars.peek() == Some(&options.quote_char) {
                    current.push(c);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == options.quote_char && current.trim().is_empty() {
            current.clear();
            in_quotes = true;
            quoted = true;
        } else if c == options.delimiter {
            fields.push(finish(&mut current, quoted));
            quoted = false;
        } else if !(quoted && c.is_whitespace()) {
            current.push(c);
        }
    }
    fields.push(finish(&mut current, quoted));

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeSpec;

    fn decl(name: &str, ty: TypeSpec) -> ColumnDecl {
        ColumnDecl {
            name: name.to_string(),
            ty,
        }
    }

    #[test]
    fn test_parse_records_coerces_and_drops_header() {
        let records =
            parse_records(b"id, name ,score\n1, a ,2.5\n2,\"3\"\n", &CsvOptions::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0][0], Value::Int(1));
        assert_eq!(records[0][1], Value::string("a"));
        assert_eq!(records[0][2], Value::Float(2.5));
        // quoted digits stay text; short rows are accepted
        assert!(matches!(&records[1][1], Value::String(s) if &**s == "3"));
        assert_eq!(records[1].len(), 2);
    }

    #[test]
    fn test_parse_csv_line_escaped_quotes() {
        let fields = parse_csv_line(r#"1,"say ""hi""",x"#, &CsvOptions::default());
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1].text, r#"say "hi""#);
        assert!(fields[1].quoted);
    }

    #[test]
    fn test_seed_rows_vector_columns_consume_fields() {
        let columns = vec![
            decl("id", TypeSpec::scalar("int")),
            decl("pos", TypeSpec::vector("float", 2)),
            decl("label", TypeSpec::scalar("string")),
        ];
        let records = parse_records(b"h\n7,0.5,1,tip\n8,1,2\n", &CsvOptions::default()).unwrap();
        let rows = seed_rows(records, &columns).unwrap();

        assert_eq!(
            rows[0].render(),
            "id: 7, pos: Float64Array.from([0.5,1]), label: \"tip\""
        );
        assert_eq!(rows[1].get("label"), Some(&Value::Null));
    }

    #[test]
    fn test_seed_rows_rejects_text_in_vectors() {
        let columns = vec![decl("pos", TypeSpec::vector("int", 2))];
        let records = parse_records(b"h\n1,two\n", &CsvOptions::default()).unwrap();
        let err = seed_rows(records, &columns).unwrap_err();
        assert!(matches!(err, StorageError::ParseError(_)));
    }
}
