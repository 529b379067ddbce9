//! Schema inference over sampled records.
//!
//! The keys of the first record define the column universe. For every column the
//! first `sample_rows` records are scanned until a non-null value turns up, and that
//! value's shape decides the type. Anything ambiguous falls back to
//! [`ColumnType::String`], which every later null-tolerant store can hold.

use crate::error::{PipelineError, Result};
use crate::table::{ColumnType, InferredColumn, Record, Value};
use serde_json::Value as Json;

/// Default number of leading rows inspected per column.
pub const DEFAULT_SAMPLE_ROWS: usize = 100;

/// Infers one column descriptor per key of the first record, in record order.
///
/// # Errors
///
/// Returns [`PipelineError::SchemaInference`] when `samples` is empty.
pub fn infer(samples: &[Record], sample_rows: usize) -> Result<Vec<InferredColumn>> {
    let first = samples.first().ok_or_else(|| {
        PipelineError::SchemaInference("cannot infer a schema from zero records".to_owned())
    })?;
    let prefix = &samples[..samples.len().min(sample_rows.max(1))];

    Ok(first
        .keys()
        .map(|name| infer_column(name, prefix.iter().map(|r| r.get(name))))
        .collect())
}

/// Same as [`infer`] for rows that are already in [`Value`] form, such as the
/// result set of the silver join.
pub fn infer_values(
    names: &[String],
    rows: &[Vec<Value>],
    sample_rows: usize,
) -> Result<Vec<InferredColumn>> {
    if rows.is_empty() {
        return Err(PipelineError::SchemaInference(
            "cannot infer a schema from zero rows".to_owned(),
        ));
    }
    let prefix = &rows[..rows.len().min(sample_rows.max(1))];

    Ok(names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let mut nullable = false;
            let mut kind = None;
            for row in prefix {
                match row.get(idx).unwrap_or(&Value::Null) {
                    Value::Null => nullable = true,
                    value => {
                        if kind.is_none() {
                            kind = Some(classify_value(value));
                        }
                    }
                }
            }
            InferredColumn::new(name.clone(), kind.unwrap_or(ColumnType::String), nullable)
        })
        .collect())
}

fn infer_column<'a>(name: &str, values: impl Iterator<Item = Option<&'a Json>>) -> InferredColumn {
    let mut nullable = false;
    let mut kind = None;

    for value in values {
        match value {
            None | Some(Json::Null) => nullable = true,
            Some(value) => {
                if kind.is_none() {
                    kind = Some(classify_json(value));
                }
            }
        }
    }

    InferredColumn::new(name, kind.unwrap_or(ColumnType::String), nullable)
}

/// Classifies a single non-null JSON value.
pub fn classify_json(value: &Json) -> ColumnType {
    match value {
        Json::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
        Json::Number(_) => ColumnType::Float,
        Json::String(s) => classify_str(s),
        _ => ColumnType::String,
    }
}

fn classify_value(value: &Value) -> ColumnType {
    match value {
        Value::Integer(_) => ColumnType::Integer,
        Value::Float(_) => ColumnType::Float,
        Value::Text(s) => classify_str(s),
        Value::Null => ColumnType::String,
    }
}

/// A string is numeric only when it parses in full.
pub fn classify_str(s: &str) -> ColumnType {
    if s.parse::<i64>().is_ok() {
        ColumnType::Integer
    } else if s.parse::<f64>().is_ok_and(f64::is_finite) {
        ColumnType::Float
    } else {
        ColumnType::String
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: &[Json]) -> Vec<Record> {
        values
            .iter()
            .map(|v| {
                let mut r = Record::new();
                r.insert("col".to_owned(), v.clone());
                r
            })
            .collect()
    }

    fn kind_of(values: &[Json]) -> ColumnType {
        infer(&records(values), DEFAULT_SAMPLE_ROWS).unwrap()[0].kind
    }

    #[test]
    fn test_first_non_null_value_decides() {
        assert_eq!(kind_of(&[json!("1"), json!("2"), json!("abc")]), ColumnType::Integer);
        assert_eq!(kind_of(&[json!(null), json!(null), json!("3.5")]), ColumnType::Float);
        assert_eq!(kind_of(&[json!(null), json!(null), json!(null)]), ColumnType::String);
    }

    #[test]
    fn test_native_numbers() {
        assert_eq!(kind_of(&[json!(7)]), ColumnType::Integer);
        assert_eq!(kind_of(&[json!(4.2)]), ColumnType::Float);
        assert_eq!(kind_of(&[json!(true)]), ColumnType::String);
        assert_eq!(kind_of(&[json!("2023KW02")]), ColumnType::String);
        assert_eq!(kind_of(&[json!("4,2")]), ColumnType::String);
        assert_eq!(kind_of(&[json!("NaN")]), ColumnType::String);
    }

    #[test]
    fn test_sample_limit_bounds_the_scan() {
        let values = [json!(null), json!(null), json!("5")];
        let cols = infer(&records(&values), 2).unwrap();
        assert_eq!(cols[0].kind, ColumnType::String);
        assert!(cols[0].nullable);
    }

    #[test]
    fn test_first_record_defines_columns() {
        let mut a = Record::new();
        a.insert("ID".to_owned(), json!(0));
        a.insert("Title".to_owned(), json!("x"));
        let mut b = Record::new();
        b.insert("ID".to_owned(), json!(1));
        b.insert("Extra".to_owned(), json!("ignored"));

        let cols = infer(&[a, b], DEFAULT_SAMPLE_ROWS).unwrap();
        let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ID", "Title"]);
        assert!(!cols[0].nullable);
        assert!(cols[1].nullable, "missing key in a later record counts as null");
    }

    #[test]
    fn test_inference_is_deterministic() {
        let values = [json!(null), json!("10"), json!(2.5)];
        let first = infer(&records(&values), DEFAULT_SAMPLE_ROWS).unwrap();
        let second = infer(&records(&values), DEFAULT_SAMPLE_ROWS).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_sample_is_an_error() {
        assert!(matches!(
            infer(&[], DEFAULT_SAMPLE_ROWS),
            Err(PipelineError::SchemaInference(_))
        ));
    }

    #[test]
    fn test_infer_values() {
        let names = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let rows = vec![
            vec![Value::Null, Value::Text("x".to_owned()), Value::Null],
            vec![Value::Text("3.5".to_owned()), Value::Integer(1), Value::Null],
        ];
        let cols = infer_values(&names, &rows, DEFAULT_SAMPLE_ROWS).unwrap();
        assert_eq!(cols[0].kind, ColumnType::Float);
        assert_eq!(cols[1].kind, ColumnType::String);
        assert_eq!(cols[2].kind, ColumnType::String);
        assert!(cols[2].nullable);
    }
}
